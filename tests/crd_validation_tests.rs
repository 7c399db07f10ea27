//! # CRD Validation Tests
//!
//! Sample SecretClaim manifests deserialize as expected and the generated
//! CRD carries the expected identity, so schema drift is caught early.

use generic_secrets_controller::crd::{SecretClaim, GROUP, KIND, VERSION};
use kube::core::CustomResourceExt;

#[test]
fn test_plain_claim_manifest() {
    let yaml = r#"
apiVersion: dolansoft.org/v1beta1
kind: SecretClaim
metadata:
  name: postgres
  namespace: default
spec:
  tokenFields:
    - password
  fixedFields:
    username: app
"#;
    let claim: SecretClaim = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(claim.metadata.name.as_deref(), Some("postgres"));
    assert_eq!(claim.spec.token_fields, vec!["password".to_string()]);
    assert_eq!(claim.spec.fixed_fields["username"], "app");
    assert!(claim.spec.x509.is_none());
}

#[test]
fn test_x509_claim_manifest() {
    let yaml = r#"
apiVersion: dolansoft.org/v1beta1
kind: SecretClaim
metadata:
  name: api-tls
  namespace: default
spec:
  x509:
    caSecretName: internal-ca
    commonName: api
    rotateEvery: 90d
    serviceNames:
      - api
    extraNames:
      - api.example.com
"#;
    let claim: SecretClaim = serde_yaml::from_str(yaml).unwrap();
    let x509 = claim.spec.x509.unwrap();
    assert_eq!(x509.ca_secret_name, "internal-ca");
    assert_eq!(x509.common_name, "api");
    assert_eq!(x509.rotate_every, "90d");
    assert!(!x509.is_ca);
    assert!(!x509.legacy_private_key_encoding);
}

#[test]
fn test_generated_crd_identity() {
    let crd = SecretClaim::crd();
    assert_eq!(crd.spec.group, GROUP);
    assert_eq!(crd.spec.names.kind, KIND);
    assert_eq!(crd.spec.names.plural, "secretclaims");
    assert_eq!(crd.spec.scope, "Namespaced");
    assert_eq!(crd.spec.versions.len(), 1);
    assert_eq!(crd.spec.versions[0].name, VERSION);
    assert!(crd.spec.versions[0]
        .subresources
        .as_ref()
        .and_then(|s| s.status.as_ref())
        .is_some());

    let yaml = serde_yaml::to_string(&crd).unwrap();
    assert!(yaml.contains("tokenFields"));
    assert!(yaml.contains("isCA"));
}
