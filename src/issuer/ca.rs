//! # CA Resolver
//!
//! Loads the CA certificate and key that sign chained certificates.
//!
//! The CA lives in a Secret in the claim's namespace under `ca.crt` and `ca.key`,
//! which is also where a claim with `isCA: true` writes its output, so one claim
//! can issue the CA that others chain to. The key may be PKCS#8
//! (`PRIVATE KEY`) or SEC1 (`EC PRIVATE KEY`); the PEM label decides. SEC1
//! keys are accepted on P-256 and P-384.

use crate::constants::{
    CA_CERT_KEY, CA_PRIVATE_KEY_KEY, PEM_CERTIFICATE_LABEL, PEM_PKCS8_KEY_LABEL,
    PEM_SEC1_KEY_LABEL,
};
use crate::store::{SecretStore, StoreError};
use p256::pkcs8::{AssociatedOid, EncodePrivateKey, SecretDocument};
use rcgen::{Certificate, CertificateParams, KeyPair};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CaError {
    #[error("CA secret {namespace}/{name} not found")]
    SecretNotFound { namespace: String, name: String },
    #[error("failed to fetch CA secret {namespace}/{name}: {source}")]
    Fetch {
        namespace: String,
        name: String,
        #[source]
        source: StoreError,
    },
    #[error("CA secret {0} has no ca.crt")]
    MissingCertificate(String),
    #[error("CA secret {0} has no ca.key")]
    MissingKey(String),
    #[error("invalid CA certificate: {0}")]
    InvalidCertificate(String),
    #[error("invalid CA private key: {0}")]
    InvalidKey(String),
    #[error("unsupported CA private key type '{0}'")]
    UnsupportedKeyType(String),
}

impl CaError {
    /// Whether retrying without changing any resource can succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Fetch { .. })
    }
}

/// A parsed CA, ready to sign
pub struct CertificateAuthority {
    certificate: Certificate,
    key_pair: KeyPair,
    subject: String,
    subject_der: Vec<u8>,
}

impl std::fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

impl CertificateAuthority {
    pub(crate) fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub(crate) fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// Subject distinguished name of the CA certificate
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Subject `Name` exactly as encoded in the CA certificate
    #[must_use]
    pub fn subject_der(&self) -> &[u8] {
        &self.subject_der
    }
}

/// Resolves CA references against the Secret store
#[derive(Clone, Copy)]
pub struct CaResolver<'a> {
    secrets: &'a dyn SecretStore,
}

impl std::fmt::Debug for CaResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaResolver").finish_non_exhaustive()
    }
}

impl<'a> CaResolver<'a> {
    #[must_use]
    pub fn new(secrets: &'a dyn SecretStore) -> Self {
        Self { secrets }
    }

    /// Fetch and parse the CA Secret `namespace/name`
    ///
    /// # Errors
    ///
    /// Returns `CaError` naming the missing or malformed artifact.
    pub async fn resolve(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<CertificateAuthority, CaError> {
        let secret = self
            .secrets
            .get(namespace, name)
            .await
            .map_err(|source| CaError::Fetch {
                namespace: namespace.to_string(),
                name: name.to_string(),
                source,
            })?
            .ok_or_else(|| CaError::SecretNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;

        let data = secret.data.unwrap_or_default();
        let cert_pem = data
            .get(CA_CERT_KEY)
            .ok_or_else(|| CaError::MissingCertificate(format!("{namespace}/{name}")))?;
        let key_pem = data
            .get(CA_PRIVATE_KEY_KEY)
            .ok_or_else(|| CaError::MissingKey(format!("{namespace}/{name}")))?;

        let ca = parse_ca_material(&cert_pem.0, &key_pem.0)?;
        debug!(ca.secret = %format!("{namespace}/{name}"), ca.subject = %ca.subject, "Resolved CA");
        Ok(ca)
    }
}

/// Parse a PEM certificate and matching PEM private key into a signing CA
///
/// # Errors
///
/// Returns `CaError::InvalidCertificate` / `InvalidKey` / `UnsupportedKeyType`
/// describing what could not be parsed, or `InvalidKey` if the key does not
/// belong to the certificate.
pub fn parse_ca_material(cert_pem: &[u8], key_pem: &[u8]) -> Result<CertificateAuthority, CaError> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(cert_pem)
        .map_err(|e| CaError::InvalidCertificate(format!("not PEM: {e}")))?;
    if pem.label != PEM_CERTIFICATE_LABEL {
        return Err(CaError::InvalidCertificate(format!(
            "unexpected PEM block '{}'",
            pem.label
        )));
    }
    let parsed = pem
        .parse_x509()
        .map_err(|e| CaError::InvalidCertificate(e.to_string()))?;
    let subject = parsed.subject().to_string();
    let subject_der = parsed.subject().as_raw().to_vec();
    let cert_public_key = parsed.public_key().subject_public_key.data.to_vec();

    let key_pair = parse_private_key(key_pem)?;
    if key_pair.public_key_raw() != cert_public_key.as_slice() {
        return Err(CaError::InvalidKey(
            "private key does not match the CA certificate".to_string(),
        ));
    }

    let cert_pem_str = std::str::from_utf8(cert_pem)
        .map_err(|e| CaError::InvalidCertificate(format!("not UTF-8: {e}")))?;
    let params = CertificateParams::from_ca_cert_pem(cert_pem_str)
        .map_err(|e| CaError::InvalidCertificate(e.to_string()))?;
    // Signs through rcgen, whose name model may re-encode the subject; issued
    // certificates get `subject_der` as their issuer. ca.crt is never rewritten.
    let certificate = params
        .self_signed(&key_pair)
        .map_err(|e| CaError::InvalidKey(e.to_string()))?;

    Ok(CertificateAuthority {
        certificate,
        key_pair,
        subject,
        subject_der,
    })
}

fn parse_private_key(key_pem: &[u8]) -> Result<KeyPair, CaError> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(key_pem)
        .map_err(|e| CaError::InvalidKey(format!("not PEM: {e}")))?;

    match pem.label.as_str() {
        PEM_PKCS8_KEY_LABEL => KeyPair::try_from(pem.contents.as_slice())
            .map_err(|e| CaError::InvalidKey(e.to_string())),
        PEM_SEC1_KEY_LABEL => {
            let pkcs8 = sec1_to_pkcs8(&pem.contents)?;
            KeyPair::try_from(pkcs8.as_bytes()).map_err(|e| CaError::InvalidKey(e.to_string()))
        }
        other => Err(CaError::UnsupportedKeyType(other.to_string())),
    }
}

/// Re-wrap a SEC1 EC key as PKCS#8, picking the curve from its parameters
///
/// Keys without parameters are matched by private scalar length.
fn sec1_to_pkcs8(der: &[u8]) -> Result<SecretDocument, CaError> {
    let key = sec1::EcPrivateKey::try_from(der)
        .map_err(|e| CaError::InvalidKey(format!("not a SEC1 key: {e}")))?;
    let curve = key.parameters.and_then(sec1::EcParameters::named_curve);
    let invalid = |e: p256::elliptic_curve::Error| CaError::InvalidKey(format!("bad EC key: {e}"));
    let encoded = match curve {
        Some(oid) if oid == p256::NistP256::OID => {
            p256::SecretKey::from_sec1_der(der).map_err(invalid)?.to_pkcs8_der()
        }
        Some(oid) if oid == p384::NistP384::OID => {
            p384::SecretKey::from_sec1_der(der).map_err(invalid)?.to_pkcs8_der()
        }
        None if key.private_key.len() == 32 => {
            p256::SecretKey::from_sec1_der(der).map_err(invalid)?.to_pkcs8_der()
        }
        None if key.private_key.len() == 48 => {
            p384::SecretKey::from_sec1_der(der).map_err(invalid)?.to_pkcs8_der()
        }
        Some(oid) => return Err(CaError::UnsupportedKeyType(format!("EC key on curve {oid}"))),
        None => {
            return Err(CaError::UnsupportedKeyType(
                "EC key without curve parameters".to_string(),
            ))
        }
    };
    encoded.map_err(|e| CaError::InvalidKey(e.to_string()))
}
