//! # JSON Patch
//!
//! RFC 6902 operations used to update Secret data in place.
//!
//! Every patch starts with a `test` of the resource version the reconciler
//! read, so a Secret changed by someone else in between is never overwritten
//! on a stale basis. The `add` operations address one entry of the Secret's
//! `data` map each and carry the base64-encoded value, which is how the API
//! server expects `data` entries.

use base64::Engine;
use json_patch::jsonptr::PointerBuf;
use json_patch::{AddOperation, TestOperation};

pub use json_patch::{Patch, PatchOperation};

/// `test` that the Secret is still at the resource version it was read at
#[must_use]
pub fn test_resource_version(resource_version: &str) -> PatchOperation {
    PatchOperation::Test(TestOperation {
        path: PointerBuf::from_tokens(["metadata", "resourceVersion"]),
        value: serde_json::Value::String(resource_version.to_string()),
    })
}

/// `add` of one Secret data field, value base64 encoded
#[must_use]
pub fn add_data_field(field: &str, value: &[u8]) -> PatchOperation {
    PatchOperation::Add(AddOperation {
        path: PointerBuf::from_tokens(["data", field]),
        value: serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(value)),
    })
}

/// `add` of an empty data map, for Secrets stored without any data
#[must_use]
pub fn add_empty_data() -> PatchOperation {
    PatchOperation::Add(AddOperation {
        path: PointerBuf::from_tokens(["data"]),
        value: serde_json::Value::Object(serde_json::Map::new()),
    })
}
