//! # Kubernetes Stores
//!
//! `ClaimStore` and `SecretStore` backed by `kube::Api`.

use super::{ClaimStore, SecretStore, StoreError};
use crate::crd::SecretClaim;
use crate::jsonpatch::PatchOperation;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::debug;

/// SecretClaims read straight from the API server
#[derive(Clone)]
pub struct KubeClaimStore {
    client: Client,
}

impl KubeClaimStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl std::fmt::Debug for KubeClaimStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClaimStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl ClaimStore for KubeClaimStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<SecretClaim>, StoreError> {
        let api: Api<SecretClaim> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}

/// Secrets in the API server, mutations tagged with a field manager
#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
    field_manager: String,
}

impl KubeSecretStore {
    #[must_use]
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl std::fmt::Debug for KubeSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretStore")
            .field("field_manager", &self.field_manager)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn create(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let namespace = secret.metadata.namespace.as_deref().unwrap_or("default");
        let name = secret.metadata.name.as_deref().unwrap_or("unknown");
        let params = PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        match self.api(namespace).create(&params, secret).await {
            Ok(created) => Ok(created),
            Err(kube::Error::Api(api_err)) if api_err.code == 409 => Err(StoreError::Conflict(
                format!("secret {namespace}/{name} already exists"),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn patch(
        &self,
        namespace: &str,
        name: &str,
        ops: &[PatchOperation],
    ) -> Result<Secret, StoreError> {
        let params = PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        debug!(
            resource.namespace = namespace,
            resource.name = name,
            operations = ops.len(),
            "store.secret.patch"
        );
        match self
            .api(namespace)
            .patch(
                name,
                &params,
                &Patch::Json::<()>(json_patch::Patch(ops.to_vec())),
            )
            .await
        {
            Ok(patched) => Ok(patched),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                Err(StoreError::NotFound(format!("secret {namespace}/{name}")))
            }
            // A failed `test` operation comes back as 422 Unprocessable Entity
            Err(kube::Error::Api(api_err)) if api_err.code == 409 || api_err.code == 422 => Err(
                StoreError::Conflict(format!("secret {namespace}/{name}: {}", api_err.message)),
            ),
            Err(e) => Err(e.into()),
        }
    }
}
