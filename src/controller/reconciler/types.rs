//! # Types
//!
//! Core types for the reconciler.

use crate::controller::reconciler::reconcile;
use crate::issuer::{CredentialIssuer, IssueError};
use crate::random::RandomError;
use crate::store::{ClaimStore, SecretStore, StoreError};
use std::sync::Arc;
use thiserror::Error;

/// How a reconciliation error is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The claim disappeared mid-flight; nothing left to do
    NotFound,
    /// Store or entropy failure; retried with backoff
    Transient,
    /// Bad claim content or CA material; retried with backoff until corrected
    MalformedInput,
    /// Internal defect; stops the controller
    Fatal,
}

impl ErrorKind {
    /// Label used in logs and metrics
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not-found",
            ErrorKind::Transient => "transient",
            ErrorKind::MalformedInput => "malformed-input",
            ErrorKind::Fatal => "fatal",
        }
    }

    /// Whether the key goes back on the queue with backoff
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::MalformedInput)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("invalid queue key '{0}': expected namespace/name")]
    InvalidKey(String),
    #[error("failed to get claim {key}: {source}")]
    GetClaim {
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to get secret {key}: {source}")]
    GetSecret {
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to create secret {key}: {source}")]
    CreateSecret {
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to patch secret {key}: {source}")]
    PatchSecret {
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to issue credentials for {key}: {source}")]
    Issue {
        key: String,
        #[source]
        source: IssueError,
    },
    #[error("failed to generate tokens for {key}: {source}")]
    Random {
        key: String,
        #[source]
        source: RandomError,
    },
    #[error("claim {0} has no uid, cannot reference it as owner")]
    MissingOwnerIdentity(String),
}

impl ReconcilerError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidKey(_) => ErrorKind::Fatal,
            // Claim stores may report absence as an error instead of `None`
            Self::GetClaim {
                source: StoreError::NotFound(_),
                ..
            } => ErrorKind::NotFound,
            // A patch we built that the store cannot encode or apply is a defect
            Self::PatchSecret {
                source: StoreError::InvalidPatch(_),
                ..
            } => ErrorKind::Fatal,
            Self::GetClaim { .. }
            | Self::GetSecret { .. }
            | Self::CreateSecret { .. }
            | Self::PatchSecret { .. }
            | Self::Random { .. } => ErrorKind::Transient,
            Self::Issue { source, .. } => {
                if source.is_malformed_input() {
                    ErrorKind::MalformedInput
                } else {
                    ErrorKind::Transient
                }
            }
            Self::MissingOwnerIdentity(_) => ErrorKind::MalformedInput,
        }
    }
}

/// What a successful reconciliation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The claim no longer exists
    ClaimGone,
    /// The Secret did not exist and was created
    Created,
    /// The Secret was patched; names of the written fields
    Patched(Vec<String>),
    /// The Secret already matched the claim
    UpToDate,
    /// The Secret holds a certificate, which is never reissued
    X509Unmanaged,
}

impl ReconcileOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::ClaimGone => "claim-gone",
            ReconcileOutcome::Created => "created",
            ReconcileOutcome::Patched(_) => "patched",
            ReconcileOutcome::UpToDate => "up-to-date",
            ReconcileOutcome::X509Unmanaged => "x509-unmanaged",
        }
    }

    /// Whether the Secret store was written to
    #[must_use]
    pub fn mutated(&self) -> bool {
        matches!(self, ReconcileOutcome::Created | ReconcileOutcome::Patched(_))
    }
}

/// Reconciliation context: the stores and the issuer
#[derive(Clone)]
pub struct Reconciler {
    pub(crate) claims: Arc<dyn ClaimStore>,
    pub(crate) secrets: Arc<dyn SecretStore>,
    pub(crate) issuer: CredentialIssuer,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(
        claims: Arc<dyn ClaimStore>,
        secrets: Arc<dyn SecretStore>,
        issuer: CredentialIssuer,
    ) -> Self {
        Self {
            claims,
            secrets,
            issuer,
        }
    }

    /// Converge the Secret of the claim behind `key` (`namespace/name`)
    ///
    /// # Errors
    ///
    /// Returns `ReconcilerError`; `kind()` tells how to handle it.
    pub async fn reconcile(&self, key: &str) -> Result<ReconcileOutcome, ReconcilerError> {
        reconcile::reconcile(self, key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuer::DurationError;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ReconcilerError::InvalidKey("x".to_string()).kind(),
            ErrorKind::Fatal
        );
        assert_eq!(
            ReconcilerError::GetClaim {
                key: "ns/x".to_string(),
                source: StoreError::NotFound("ns/x".to_string()),
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ReconcilerError::CreateSecret {
                key: "ns/x".to_string(),
                source: StoreError::Unavailable("down".to_string()),
            }
            .kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            ReconcilerError::PatchSecret {
                key: "ns/x".to_string(),
                source: StoreError::InvalidPatch("bad".to_string()),
            }
            .kind(),
            ErrorKind::Fatal
        );
        assert_eq!(
            ReconcilerError::Issue {
                key: "ns/x".to_string(),
                source: IssueError::InvalidDuration(DurationError {
                    input: "soon".to_string(),
                    reason: "no unit".to_string(),
                }),
            }
            .kind(),
            ErrorKind::MalformedInput
        );
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::Transient.is_retryable());
        assert!(ErrorKind::MalformedInput.is_retryable());
        assert!(!ErrorKind::NotFound.is_retryable());
        assert!(!ErrorKind::Fatal.is_retryable());
    }
}
