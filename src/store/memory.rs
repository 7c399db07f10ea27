//! # In-Memory Store
//!
//! A fake of the Kubernetes API for claims and secrets.
//!
//! Behaves like the API server where the reconciler can observe it:
//! - `create` assigns a uid and resource version and refuses duplicates
//! - `patch` applies every operation or none through `json_patch`, a failed
//!   `test` is a conflict and an `add` below a missing `/data` is rejected
//! - every successful mutation is recorded so tests can assert on them
//!
//! Failures can be injected per operation with `fail_next`.

use super::{ClaimStore, SecretData, SecretStore, StoreError};
use crate::crd::SecretClaim;
use crate::jsonpatch::PatchOperation;
use async_trait::async_trait;
use json_patch::PatchErrorKind;
use k8s_openapi::api::core::v1::Secret;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

type ObjectKey = (String, String);

/// Store operation, used to target injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    GetClaim,
    GetSecret,
    CreateSecret,
    PatchSecret,
}

/// A successful write made through the `SecretStore` interface
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Created {
        namespace: String,
        name: String,
    },
    Patched {
        namespace: String,
        name: String,
        ops: Vec<PatchOperation>,
    },
}

#[derive(Debug, Default)]
struct Inner {
    claims: BTreeMap<ObjectKey, SecretClaim>,
    secrets: BTreeMap<ObjectKey, Secret>,
    mutations: Vec<Mutation>,
    failures: HashMap<StoreOp, Vec<String>>,
    resource_version: u64,
}

impl Inner {
    fn next_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    fn take_failure(&mut self, op: StoreOp) -> Result<(), StoreError> {
        match self.failures.get_mut(&op) {
            Some(queued) if !queued.is_empty() => {
                Err(StoreError::Unavailable(queued.remove(0)))
            }
            _ => Ok(()),
        }
    }
}

/// In-process claim and secret store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread must not hide the store from the others
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Add or replace a claim, assigning a uid if it has none
    pub fn insert_claim(&self, mut claim: SecretClaim) {
        let mut inner = self.lock();
        if claim.metadata.uid.is_none() {
            claim.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        claim.metadata.resource_version = Some(inner.next_version());
        let key = object_key(&claim.metadata.namespace, &claim.metadata.name);
        inner.claims.insert(key, claim);
    }

    /// Delete a claim
    ///
    /// Owned secrets are left in place: cascading deletion is done by the
    /// garbage collector, which this fake does not run.
    pub fn remove_claim(&self, namespace: &str, name: &str) -> Option<SecretClaim> {
        self.lock()
            .claims
            .remove(&(namespace.to_string(), name.to_string()))
    }

    /// Write a secret directly, as another actor would; not recorded as a mutation
    pub fn insert_secret(&self, mut secret: Secret) {
        let mut inner = self.lock();
        secret.metadata.resource_version = Some(inner.next_version());
        let key = object_key(&secret.metadata.namespace, &secret.metadata.name);
        inner.secrets.insert(key, secret);
    }

    /// Current state of a secret
    #[must_use]
    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.lock()
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Current payload of a secret
    #[must_use]
    pub fn secret_data(&self, namespace: &str, name: &str) -> Option<SecretData> {
        self.secret(namespace, name).map(|s| super::secret_data(&s))
    }

    /// Mutations recorded so far, oldest first
    #[must_use]
    pub fn mutations(&self) -> Vec<Mutation> {
        self.lock().mutations.clone()
    }

    pub fn clear_mutations(&self) {
        self.lock().mutations.clear();
    }

    /// Make the next call of `op` fail with `StoreError::Unavailable`
    ///
    /// Calls queue up: two `fail_next` for the same op fail the next two calls.
    pub fn fail_next(&self, op: StoreOp, message: impl Into<String>) {
        self.lock()
            .failures
            .entry(op)
            .or_default()
            .push(message.into());
    }
}

fn object_key(namespace: &Option<String>, name: &Option<String>) -> ObjectKey {
    (
        namespace.clone().unwrap_or_else(|| "default".to_string()),
        name.clone().unwrap_or_default(),
    )
}

#[async_trait]
impl ClaimStore for InMemoryStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<SecretClaim>, StoreError> {
        let mut inner = self.lock();
        inner.take_failure(StoreOp::GetClaim)?;
        Ok(inner
            .claims
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }
}

#[async_trait]
impl SecretStore for InMemoryStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        let mut inner = self.lock();
        inner.take_failure(StoreOp::GetSecret)?;
        Ok(inner
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let mut inner = self.lock();
        inner.take_failure(StoreOp::CreateSecret)?;
        let key = object_key(&secret.metadata.namespace, &secret.metadata.name);
        if inner.secrets.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "secret {}/{} already exists",
                key.0, key.1
            )));
        }
        let mut created = secret.clone();
        created.metadata.namespace = Some(key.0.clone());
        created.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        created.metadata.resource_version = Some(inner.next_version());
        inner.secrets.insert(key.clone(), created.clone());
        inner.mutations.push(Mutation::Created {
            namespace: key.0,
            name: key.1,
        });
        Ok(created)
    }

    async fn patch(
        &self,
        namespace: &str,
        name: &str,
        ops: &[PatchOperation],
    ) -> Result<Secret, StoreError> {
        let mut inner = self.lock();
        inner.take_failure(StoreOp::PatchSecret)?;
        let key = (namespace.to_string(), name.to_string());
        let current = inner
            .secrets
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(format!("secret {namespace}/{name}")))?;

        let mut patched = apply_patch(current, ops)?;
        patched.metadata.resource_version = Some(inner.next_version());
        inner.secrets.insert(key, patched.clone());
        inner.mutations.push(Mutation::Patched {
            namespace: namespace.to_string(),
            name: name.to_string(),
            ops: ops.to_vec(),
        });
        Ok(patched)
    }
}

/// Apply `ops` to a copy of `secret`, leaving the original untouched on failure
fn apply_patch(secret: &Secret, ops: &[PatchOperation]) -> Result<Secret, StoreError> {
    let mut doc =
        serde_json::to_value(secret).map_err(|e| StoreError::InvalidPatch(e.to_string()))?;
    json_patch::patch(&mut doc, ops).map_err(|e| match e.kind {
        PatchErrorKind::TestFailed => StoreError::Conflict(format!(
            "the object has been modified: test of {} failed",
            e.path
        )),
        _ => StoreError::InvalidPatch(e.to_string()),
    })?;
    serde_json::from_value(doc).map_err(|e| StoreError::InvalidPatch(e.to_string()))
}
