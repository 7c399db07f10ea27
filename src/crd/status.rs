//! # SecretClaim Status

use serde::{Deserialize, Serialize};

/// Status of the SecretClaim resource
#[derive(Debug, Clone, Deserialize, Serialize, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretClaimStatus {
    /// Human-readable reason for the current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
