//! # SecretClaim Spec
//!
//! Main CRD specification types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// SecretClaim Custom Resource Definition
///
/// A claim describes the shape of a Secret with the same namespace and name.
/// The controller creates that Secret once and keeps its fixed fields in sync.
///
/// # Example
///
/// ```yaml
/// apiVersion: dolansoft.org/v1beta1
/// kind: SecretClaim
/// metadata:
///   name: postgres
///   namespace: default
/// spec:
///   tokenFields:
///     - password
///   fixedFields:
///     username: app
/// ```
///
/// ```yaml
/// apiVersion: dolansoft.org/v1beta1
/// kind: SecretClaim
/// metadata:
///   name: api-tls
///   namespace: default
/// spec:
///   x509:
///     caSecretName: internal-ca
///     rotateEvery: 90d
///     serviceNames:
///       - api
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "SecretClaim",
    group = "dolansoft.org",
    version = "v1beta1",
    namespaced,
    status = "crate::crd::SecretClaimStatus",
    shortname = "secc",
    printcolumn = r#"{"name":"Reason", "type":"string", "jsonPath":".status.reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SecretClaimSpec {
    /// Fields that receive a random 128 bit token, hex encoded
    /// Once written, a token is never regenerated for the lifetime of the Secret
    #[serde(default)]
    pub token_fields: Vec<String>,
    /// Fields with literal values
    /// These are kept in sync: changing a value here updates the Secret
    #[serde(default)]
    pub fixed_fields: BTreeMap<String, String>,
    /// X.509 certificate to issue instead of plain fields
    /// When set, tokenFields and fixedFields are ignored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x509: Option<X509Claim>,
}

/// Parameters of an X.509 certificate/key pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct X509Claim {
    /// Name of a Secret in the same namespace holding `ca.crt` and `ca.key`
    /// Empty means the certificate is self-signed
    #[serde(default)]
    pub ca_secret_name: String,
    /// Issue a CA certificate (written as ca.crt/ca.key) instead of a leaf (tls.crt/tls.key)
    #[serde(default, rename = "isCA")]
    pub is_ca: bool,
    /// Subject common name
    /// Defaults to the claim name
    #[serde(default)]
    pub common_name: String,
    /// Validity period, e.g. "90d", "2w", "1h30m"
    /// Empty means the certificate does not expire
    #[serde(default)]
    pub rotate_every: String,
    /// Kubernetes services this certificate is valid for
    /// Each one adds `<name>`, `<name>.<namespace>` and `<name>.<namespace>.svc.<cluster domain>`
    #[serde(default)]
    pub service_names: Vec<String>,
    /// Additional DNS names, added verbatim after the service names
    #[serde(default)]
    pub extra_names: Vec<String>,
    /// Encode the private key as SEC1 "EC PRIVATE KEY" instead of PKCS#8
    /// For consumers that cannot parse PKCS#8
    #[serde(default, alias = "legacySEC1PrivateKey")]
    pub legacy_private_key_encoding: bool,
}

impl SecretClaimSpec {
    /// Whether this claim asks for a certificate rather than plain fields
    #[must_use]
    pub fn is_x509(&self) -> bool {
        self.x509.is_some()
    }
}
