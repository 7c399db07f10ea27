//! # Stores
//!
//! The two external collaborators of the reconciler, behind async traits:
//!
//! - `ClaimStore` - read access to `SecretClaim` resources
//! - `SecretStore` - read, create and JSON-patch access to `Secret` resources
//!
//! `kubernetes.rs` implements both against the Kubernetes API, `memory.rs` is an
//! in-process fake with API-server-like semantics for tests, built only for
//! tests and with the `test-util` feature.

mod kubernetes;
#[cfg(any(test, feature = "test-util"))]
mod memory;

pub use kubernetes::{KubeClaimStore, KubeSecretStore};
#[cfg(any(test, feature = "test-util"))]
pub use memory::{InMemoryStore, Mutation, StoreOp};

use crate::crd::SecretClaim;
use crate::jsonpatch::PatchOperation;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;
use thiserror::Error;

/// Secret payload: field name to raw bytes, ordered by field name
pub type SecretData = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("{0} not found")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid patch: {0}")]
    InvalidPatch(String),
}

/// Read access to SecretClaims
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Get a claim, `None` if it does not exist
    ///
    /// Backends that cannot tell absence from a failed read up front may
    /// instead return `StoreError::NotFound`; the reconciler drops the key
    /// without retrying in that case, the same as for `None`.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<SecretClaim>, StoreError>;
}

/// Access to the Secrets materialized from claims
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Get a secret, `None` if it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError>;

    /// Create a secret; fails if it already exists
    async fn create(&self, secret: &Secret) -> Result<Secret, StoreError>;

    /// Apply JSON patch operations atomically to the current version of a secret
    ///
    /// A failed `test` operation is reported as `StoreError::Conflict`.
    async fn patch(
        &self,
        namespace: &str,
        name: &str,
        ops: &[PatchOperation],
    ) -> Result<Secret, StoreError>;
}

/// Convert an internal payload into the API representation
#[must_use]
pub fn to_secret_data(data: SecretData) -> BTreeMap<String, ByteString> {
    data.into_iter().map(|(k, v)| (k, ByteString(v))).collect()
}

/// Copy the payload out of a Secret (empty when the Secret has no data)
#[must_use]
pub fn secret_data(secret: &Secret) -> SecretData {
    secret
        .data
        .as_ref()
        .map(|data| {
            data.iter()
                .map(|(k, v)| (k.clone(), v.0.clone()))
                .collect()
        })
        .unwrap_or_default()
}
