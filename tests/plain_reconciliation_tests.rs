//! # Plain Claim Reconciliation Tests
//!
//! End-to-end reconciliation of token and fixed-field claims against the
//! in-memory store.
//!
//! These tests verify:
//! - Initial Secret creation with owner reference
//! - Idempotence of repeated reconciliations
//! - Live sync of fixed fields without touching tokens
//! - Token stability when the claim grows new fields
//! - Patching a Secret that has no data map
//! - Patches rejected when the Secret changed after it was read

mod common;

use async_trait::async_trait;
use common::{claim, harness, key, plain_spec, secret, NAMESPACE};
use generic_secrets_controller::controller::reconciler::{
    ErrorKind, ReconcileOutcome, Reconciler, ReconcilerError,
};
use generic_secrets_controller::issuer::CredentialIssuer;
use generic_secrets_controller::jsonpatch::{
    add_data_field, add_empty_data, test_resource_version, PatchOperation,
};
use generic_secrets_controller::random::SeededRandom;
use generic_secrets_controller::store::{
    ClaimStore, InMemoryStore, Mutation, SecretStore, StoreError,
};
use k8s_openapi::api::core::v1::Secret;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn is_token(value: &[u8]) -> bool {
    value.len() == 32 && value.iter().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b))
}

#[tokio::test]
async fn test_creates_secret_with_fixed_and_token_fields() {
    let h = harness();
    h.store.insert_claim(claim(
        "db",
        plain_spec(&["password", "api-key"], &[("username", "app")]),
    ));

    let outcome = h.reconciler.reconcile(&key("db")).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Created);

    let data = h.store.secret_data(NAMESPACE, "db").unwrap();
    assert_eq!(
        data.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["api-key", "password", "username"]
    );
    assert_eq!(data["username"], b"app");
    assert!(is_token(&data["password"]));
    assert!(is_token(&data["api-key"]));
    assert_ne!(data["password"], data["api-key"]);

    let stored_claim = ClaimStore::get(h.store.as_ref(), NAMESPACE, "db")
        .await
        .unwrap()
        .unwrap();
    let created = h.store.secret(NAMESPACE, "db").unwrap();
    let owners = created.metadata.owner_references.unwrap();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].api_version, "dolansoft.org/v1beta1");
    assert_eq!(owners[0].kind, "SecretClaim");
    assert_eq!(owners[0].name, "db");
    assert_eq!(Some(&owners[0].uid), stored_claim.metadata.uid.as_ref());
    assert_eq!(owners[0].controller, Some(true));
    assert_eq!(owners[0].block_owner_deletion, Some(true));
    assert_eq!(created.type_, None);
}

#[tokio::test]
async fn test_second_reconcile_is_a_no_op() {
    let h = harness();
    h.store
        .insert_claim(claim("db", plain_spec(&["password"], &[("username", "app")])));

    h.reconciler.reconcile(&key("db")).await.unwrap();
    let before = h.store.secret_data(NAMESPACE, "db").unwrap();
    h.store.clear_mutations();

    let outcome = h.reconciler.reconcile(&key("db")).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::UpToDate);
    assert!(h.store.mutations().is_empty());
    assert_eq!(h.store.secret_data(NAMESPACE, "db").unwrap(), before);
}

#[tokio::test]
async fn test_fixed_field_change_patches_only_that_field() {
    let h = harness();
    h.store.insert_claim(claim(
        "db",
        plain_spec(&["password"], &[("username", "app"), ("host", "db.local")]),
    ));
    h.reconciler.reconcile(&key("db")).await.unwrap();
    let password = h.store.secret_data(NAMESPACE, "db").unwrap()["password"].clone();
    let version = h
        .store
        .secret(NAMESPACE, "db")
        .unwrap()
        .metadata
        .resource_version
        .unwrap();
    h.store.clear_mutations();

    h.store.insert_claim(claim(
        "db",
        plain_spec(&["password"], &[("username", "admin"), ("host", "db.local")]),
    ));
    let outcome = h.reconciler.reconcile(&key("db")).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Patched(vec!["username".to_string()]));

    assert_eq!(
        h.store.mutations(),
        vec![Mutation::Patched {
            namespace: NAMESPACE.to_string(),
            name: "db".to_string(),
            ops: vec![
                test_resource_version(&version),
                add_data_field("username", b"admin"),
            ],
        }]
    );

    let data = h.store.secret_data(NAMESPACE, "db").unwrap();
    assert_eq!(data["username"], b"admin");
    assert_eq!(data["host"], b"db.local");
    assert_eq!(data["password"], password);
}

#[tokio::test]
async fn test_new_token_field_keeps_existing_tokens() {
    let h = harness();
    h.store.insert_claim(claim("db", plain_spec(&["password"], &[])));
    h.reconciler.reconcile(&key("db")).await.unwrap();
    let password = h.store.secret_data(NAMESPACE, "db").unwrap()["password"].clone();

    h.store
        .insert_claim(claim("db", plain_spec(&["password", "replication"], &[])));
    let outcome = h.reconciler.reconcile(&key("db")).await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Patched(vec!["replication".to_string()])
    );

    let data = h.store.secret_data(NAMESPACE, "db").unwrap();
    assert_eq!(data["password"], password);
    assert!(is_token(&data["replication"]));
}

#[tokio::test]
async fn test_removed_fields_are_left_in_place() {
    let h = harness();
    h.store
        .insert_claim(claim("db", plain_spec(&["password"], &[("username", "app")])));
    h.reconciler.reconcile(&key("db")).await.unwrap();
    h.store.clear_mutations();

    h.store.insert_claim(claim("db", plain_spec(&[], &[])));
    let outcome = h.reconciler.reconcile(&key("db")).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::UpToDate);
    assert!(h.store.mutations().is_empty());

    let data = h.store.secret_data(NAMESPACE, "db").unwrap();
    assert!(data.contains_key("password"));
    assert!(data.contains_key("username"));
}

#[tokio::test]
async fn test_existing_token_written_by_someone_else_is_kept() {
    let h = harness();
    h.store.insert_secret(secret("db", Some(&[("password", &b"hunter2"[..])])));
    h.store.insert_claim(claim("db", plain_spec(&["password"], &[])));

    let outcome = h.reconciler.reconcile(&key("db")).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::UpToDate);
    assert_eq!(
        h.store.secret_data(NAMESPACE, "db").unwrap()["password"],
        b"hunter2"
    );
}

#[tokio::test]
async fn test_secret_without_data_map_gets_data_created_first() {
    let h = harness();
    h.store.insert_secret(secret("db", None));
    h.store.insert_claim(claim("db", plain_spec(&[], &[("username", "app")])));

    let outcome = h.reconciler.reconcile(&key("db")).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Patched(vec!["username".to_string()]));

    let Mutation::Patched { ops, .. } = &h.store.mutations()[0] else {
        panic!("expected a patch");
    };
    assert!(matches!(ops[0], PatchOperation::Test(_)));
    assert_eq!(ops[1], add_empty_data());
    assert_eq!(ops[2], add_data_field("username", b"app"));
    assert_eq!(h.store.secret_data(NAMESPACE, "db").unwrap()["username"], b"app");
}

#[tokio::test]
async fn test_empty_claim_creates_empty_secret() {
    let h = harness();
    h.store.insert_claim(claim("empty", plain_spec(&[], &[])));

    let outcome = h.reconciler.reconcile(&key("empty")).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Created);
    let created = h.store.secret(NAMESPACE, "empty").unwrap();
    assert_eq!(created.data.map(|d| d.len()), Some(0));
}

#[tokio::test]
async fn test_deleted_claim_leaves_secret_alone() {
    let h = harness();
    h.store.insert_claim(claim("db", plain_spec(&["password"], &[])));
    h.reconciler.reconcile(&key("db")).await.unwrap();
    h.store.clear_mutations();

    h.store.remove_claim(NAMESPACE, "db");
    let outcome = h.reconciler.reconcile(&key("db")).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::ClaimGone);
    assert!(h.store.mutations().is_empty());
    assert!(h.store.secret(NAMESPACE, "db").is_some());
}

#[tokio::test]
async fn test_unknown_claim_does_nothing() {
    let h = harness();
    let outcome = h.reconciler.reconcile(&key("ghost")).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::ClaimGone);
    assert!(h.store.secret(NAMESPACE, "ghost").is_none());
}

/// Secret store where another writer touches the Secret right before the first patch lands
struct InterleavedWriter {
    inner: Arc<InMemoryStore>,
    fired: AtomicBool,
}

#[async_trait]
impl SecretStore for InterleavedWriter {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        SecretStore::get(self.inner.as_ref(), namespace, name).await
    }

    async fn create(&self, secret: &Secret) -> Result<Secret, StoreError> {
        self.inner.create(secret).await
    }

    async fn patch(
        &self,
        namespace: &str,
        name: &str,
        ops: &[PatchOperation],
    ) -> Result<Secret, StoreError> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            let mut current = self.inner.secret(namespace, name).unwrap();
            current.data.get_or_insert_with(Default::default).insert(
                "theirs".to_string(),
                k8s_openapi::ByteString(b"concurrent".to_vec()),
            );
            self.inner.insert_secret(current);
        }
        self.inner.patch(namespace, name, ops).await
    }
}

#[tokio::test]
async fn test_concurrent_write_between_read_and_patch_is_not_lost() {
    let store = Arc::new(InMemoryStore::new());
    let secrets = Arc::new(InterleavedWriter {
        inner: Arc::clone(&store),
        fired: AtomicBool::new(false),
    });
    let reconciler = Reconciler::new(
        Arc::clone(&store) as _,
        secrets,
        CredentialIssuer::new("cluster.local", Arc::new(SeededRandom::new(9))),
    );
    store.insert_secret(secret("db", Some(&[("username", &b"old"[..])])));
    store.insert_claim(claim("db", plain_spec(&[], &[("username", "new")])));

    let err = reconciler.reconcile(&key("db")).await.unwrap_err();
    assert!(matches!(
        err,
        ReconcilerError::PatchSecret {
            source: StoreError::Conflict(_),
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Transient);
    let data = store.secret_data(NAMESPACE, "db").unwrap();
    assert_eq!(data["username"], b"old");
    assert_eq!(data["theirs"], b"concurrent");

    // The retry sees the other write and keeps it
    let outcome = reconciler.reconcile(&key("db")).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Patched(vec!["username".to_string()]));
    let data = store.secret_data(NAMESPACE, "db").unwrap();
    assert_eq!(data["username"], b"new");
    assert_eq!(data["theirs"], b"concurrent");
}
