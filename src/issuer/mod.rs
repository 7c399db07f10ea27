//! # Credential Issuer
//!
//! Computes the payload of a claim's Secret.
//!
//! ## Module Structure
//!
//! - `token.rs` - fixed fields and random tokens
//! - `x509.rs` - certificate/key issuance
//! - `ca.rs` - loading the CA for chained certificates
//! - `duration.rs` - `rotateEvery` parsing

pub mod ca;
pub mod duration;
pub mod token;
pub mod x509;

pub use ca::{CaError, CaResolver, CertificateAuthority};
pub use duration::{parse_duration, DurationError};
pub use token::{build_plain_fields, generate_token};
pub use x509::{issue_certificate, subject_alt_names, CertificateRequest};

use crate::crd::{SecretClaimSpec, X509Claim};
use crate::observability::metrics;
use crate::random::{RandomError, SecureRandom};
use crate::store::{SecretData, SecretStore};
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum IssueError {
    #[error(transparent)]
    InvalidDuration(#[from] DurationError),
    #[error("certificate validity out of range: {0}")]
    Validity(String),
    #[error("invalid DNS name {0}")]
    InvalidName(String),
    #[error(transparent)]
    CaResolution(#[from] CaError),
    #[error(transparent)]
    Random(#[from] RandomError),
    #[error("key generation failed: {0}")]
    KeyGeneration(String),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("private key encoding failed: {0}")]
    KeyEncoding(String),
}

impl IssueError {
    /// Errors that persist until the claim or its CA is corrected
    #[must_use]
    pub fn is_malformed_input(&self) -> bool {
        match self {
            Self::InvalidDuration(_) | Self::Validity(_) | Self::InvalidName(_) => true,
            Self::CaResolution(e) => !e.is_transient(),
            Self::Random(_) | Self::KeyGeneration(_) | Self::Signing(_) | Self::KeyEncoding(_) => {
                false
            }
        }
    }
}

/// Builds Secret payloads for claims
///
/// Holds the cluster DNS suffix and the random source; the Secret store used
/// for CA lookups is passed per call.
#[derive(Debug, Clone)]
pub struct CredentialIssuer {
    cluster_domain: String,
    rng: Arc<dyn SecureRandom>,
}

impl CredentialIssuer {
    #[must_use]
    pub fn new(cluster_domain: impl Into<String>, rng: Arc<dyn SecureRandom>) -> Self {
        Self {
            cluster_domain: cluster_domain.into(),
            rng,
        }
    }

    #[must_use]
    pub fn cluster_domain(&self) -> &str {
        &self.cluster_domain
    }

    #[must_use]
    pub fn rng(&self) -> &dyn SecureRandom {
        self.rng.as_ref()
    }

    /// Full initial payload for the claim `namespace/name`
    ///
    /// # Errors
    ///
    /// Returns `IssueError` if a token, certificate or CA cannot be produced.
    pub async fn issue(
        &self,
        namespace: &str,
        name: &str,
        spec: &SecretClaimSpec,
        secrets: &dyn SecretStore,
    ) -> Result<SecretData, IssueError> {
        match &spec.x509 {
            Some(x509) => self.issue_x509(namespace, name, x509, secrets).await,
            None => Ok(build_plain_fields(spec, self.rng())?),
        }
    }

    /// Certificate payload, resolving the CA first when the claim names one
    ///
    /// # Errors
    ///
    /// Returns `IssueError` if the CA cannot be resolved or issuance fails.
    pub async fn issue_x509(
        &self,
        namespace: &str,
        name: &str,
        x509: &X509Claim,
        secrets: &dyn SecretStore,
    ) -> Result<SecretData, IssueError> {
        let ca = if x509.ca_secret_name.is_empty() {
            None
        } else {
            Some(
                CaResolver::new(secrets)
                    .resolve(namespace, &x509.ca_secret_name)
                    .await?,
            )
        };

        let request = CertificateRequest {
            namespace,
            claim_name: name,
            cluster_domain: &self.cluster_domain,
            spec: x509,
            not_before: OffsetDateTime::now_utc(),
        };
        debug!(
            common_name = %request.common_name(),
            is_ca = x509.is_ca,
            ca = %x509.ca_secret_name,
            "Issuing certificate"
        );
        let data = issue_certificate(&request, ca.as_ref(), self.rng())?;

        metrics::increment_certificates_issued(if x509.is_ca { "ca" } else { "leaf" });
        info!(
            common_name = %request.common_name(),
            self_signed = ca.is_none(),
            "Issued certificate"
        );
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::SeededRandom;
    use crate::store::InMemoryStore;

    fn issuer() -> CredentialIssuer {
        CredentialIssuer::new("cluster.local", Arc::new(SeededRandom::new(11)))
    }

    #[tokio::test]
    async fn test_issue_plain_claim() {
        let spec = SecretClaimSpec {
            token_fields: vec!["token".to_string()],
            ..Default::default()
        };
        let data = issuer()
            .issue("ns", "x", &spec, &InMemoryStore::new())
            .await
            .unwrap();
        assert_eq!(data["token"].len(), 32);
    }

    #[tokio::test]
    async fn test_missing_ca_is_malformed_input() {
        let spec = SecretClaimSpec {
            x509: Some(X509Claim {
                ca_secret_name: "missing-ca".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = issuer()
            .issue("ns", "x", &spec, &InMemoryStore::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IssueError::CaResolution(CaError::SecretNotFound { .. })));
        assert!(err.is_malformed_input());
    }

    #[tokio::test]
    async fn test_bad_rotate_every_is_malformed_input() {
        let spec = SecretClaimSpec {
            x509: Some(X509Claim {
                rotate_every: "fortnightly".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = issuer()
            .issue("ns", "x", &spec, &InMemoryStore::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IssueError::InvalidDuration(_)));
        assert!(err.is_malformed_input());
    }

    #[test]
    fn test_random_failure_is_transient() {
        let err = IssueError::KeyGeneration("entropy".to_string());
        assert!(!err.is_malformed_input());
    }
}
