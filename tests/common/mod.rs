//! Common test utilities for reconciliation tests
//!
//! Builds a reconciler wired to an in-memory store and a seeded random source,
//! plus fixtures for claims and secrets.

#![allow(dead_code)]

use generic_secrets_controller::controller::reconciler::Reconciler;
use generic_secrets_controller::crd::{SecretClaim, SecretClaimSpec, X509Claim};
use generic_secrets_controller::issuer::CredentialIssuer;
use generic_secrets_controller::random::SeededRandom;
use generic_secrets_controller::store::InMemoryStore;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const NAMESPACE: &str = "apps";

/// Reconciler and the store behind both of its interfaces
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub reconciler: Reconciler,
}

pub fn harness() -> Harness {
    harness_with_seed(42)
}

pub fn harness_with_seed(seed: u64) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let issuer = CredentialIssuer::new("cluster.local", Arc::new(SeededRandom::new(seed)));
    let reconciler = Reconciler::new(Arc::clone(&store) as _, Arc::clone(&store) as _, issuer);
    Harness { store, reconciler }
}

pub fn key(name: &str) -> String {
    format!("{NAMESPACE}/{name}")
}

pub fn claim(name: &str, spec: SecretClaimSpec) -> SecretClaim {
    let mut claim = SecretClaim::new(name, spec);
    claim.metadata.namespace = Some(NAMESPACE.to_string());
    claim
}

pub fn plain_spec(tokens: &[&str], fixed: &[(&str, &str)]) -> SecretClaimSpec {
    SecretClaimSpec {
        token_fields: tokens.iter().map(|t| t.to_string()).collect(),
        fixed_fields: fixed
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        x509: None,
    }
}

pub fn x509_spec(x509: X509Claim) -> SecretClaimSpec {
    SecretClaimSpec {
        x509: Some(x509),
        ..SecretClaimSpec::default()
    }
}

/// Secret as another actor would have written it
pub fn secret(name: &str, data: Option<&[(&str, &[u8])]>) -> Secret {
    Secret {
        metadata: ObjectMeta {
            namespace: Some(NAMESPACE.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        },
        data: data.map(|entries| {
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), ByteString(v.to_vec())))
                .collect::<BTreeMap<_, _>>()
        }),
        ..Default::default()
    }
}
