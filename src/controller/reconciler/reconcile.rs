//! # Reconciliation Logic
//!
//! Per-key state machine:
//!
//! | Claim   | Secret  | Action                                   |
//! |---------|---------|------------------------------------------|
//! | absent  | any     | nothing (owner references clean up)      |
//! | present | absent  | build the full payload and create        |
//! | X.509   | present | nothing (certificates are issued once)   |
//! | plain   | present | patch changed fixed / missing token fields |

use super::diff::{changed_fields, patch_ops};
use super::types::{ReconcileOutcome, Reconciler, ReconcilerError};
use crate::crd::SecretClaim;
use crate::observability::metrics;
use crate::store::{secret_data, to_secret_data};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use std::time::Instant;
use tracing::{debug, info, Instrument};

/// Split `namespace/name`; both parts must be non-empty
#[must_use]
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    let (namespace, name) = key.split_once('/')?;
    if namespace.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some((namespace, name))
}

/// Queue key of a claim, `None` if it lacks a namespace or name
#[must_use]
pub fn claim_key(claim: &SecretClaim) -> Option<String> {
    let namespace = claim.meta().namespace.as_deref()?;
    let name = claim.meta().name.as_deref()?;
    Some(format!("{namespace}/{name}"))
}

pub async fn reconcile(
    ctx: &Reconciler,
    key: &str,
) -> Result<ReconcileOutcome, ReconcilerError> {
    let (namespace, name) =
        split_key(key).ok_or_else(|| ReconcilerError::InvalidKey(key.to_string()))?;

    let span = tracing::span!(
        tracing::Level::INFO,
        "reconcile",
        resource.namespace = namespace,
        resource.name = name,
        resource.kind = "SecretClaim"
    );

    async move {
        let start = Instant::now();
        metrics::increment_reconciliations();
        let result = reconcile_claim(ctx, key, namespace, name).await;
        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
        if let Ok(outcome) = &result {
            debug!(outcome = outcome.as_str(), "Reconciled");
        }
        result
    }
    .instrument(span)
    .await
}

async fn reconcile_claim(
    ctx: &Reconciler,
    key: &str,
    namespace: &str,
    name: &str,
) -> Result<ReconcileOutcome, ReconcilerError> {
    let Some(claim) = ctx
        .claims
        .get(namespace, name)
        .await
        .map_err(|source| ReconcilerError::GetClaim {
            key: key.to_string(),
            source,
        })?
    else {
        debug!("Claim no longer exists, nothing to do");
        return Ok(ReconcileOutcome::ClaimGone);
    };

    let existing = ctx
        .secrets
        .get(namespace, name)
        .await
        .map_err(|source| ReconcilerError::GetSecret {
            key: key.to_string(),
            source,
        })?;

    match existing {
        None => build_initial(ctx, key, namespace, name, &claim).await,
        // Certificates are issued once; rotation of existing secrets is not implemented
        Some(_) if claim.spec.is_x509() => Ok(ReconcileOutcome::X509Unmanaged),
        Some(secret) => diff_and_patch(ctx, key, namespace, name, &claim, &secret).await,
    }
}

async fn build_initial(
    ctx: &Reconciler,
    key: &str,
    namespace: &str,
    name: &str,
    claim: &SecretClaim,
) -> Result<ReconcileOutcome, ReconcilerError> {
    let owner = claim
        .controller_owner_ref(&())
        .ok_or_else(|| ReconcilerError::MissingOwnerIdentity(key.to_string()))?;

    let data = ctx
        .issuer
        .issue(namespace, name, &claim.spec, ctx.secrets.as_ref())
        .await
        .map_err(|source| ReconcilerError::Issue {
            key: key.to_string(),
            source,
        })?;
    let fields: Vec<String> = data.keys().cloned().collect();

    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        data: Some(to_secret_data(data)),
        ..Default::default()
    };

    ctx.secrets
        .create(&secret)
        .await
        .map_err(|source| ReconcilerError::CreateSecret {
            key: key.to_string(),
            source,
        })?;

    metrics::increment_secrets_created();
    info!(fields = ?fields, "Created secret");
    Ok(ReconcileOutcome::Created)
}

async fn diff_and_patch(
    ctx: &Reconciler,
    key: &str,
    namespace: &str,
    name: &str,
    claim: &SecretClaim,
    secret: &Secret,
) -> Result<ReconcileOutcome, ReconcilerError> {
    let stored = secret_data(secret);
    let changed = changed_fields(&claim.spec, &stored, ctx.issuer.rng()).map_err(|source| {
        ReconcilerError::Random {
            key: key.to_string(),
            source,
        }
    })?;

    if changed.is_empty() {
        return Ok(ReconcileOutcome::UpToDate);
    }

    let ops = patch_ops(
        &changed,
        secret.metadata.resource_version.as_deref(),
        secret.data.is_some(),
    );
    ctx.secrets
        .patch(namespace, name, &ops)
        .await
        .map_err(|source| ReconcilerError::PatchSecret {
            key: key.to_string(),
            source,
        })?;

    let fields: Vec<String> = changed.into_keys().collect();
    metrics::increment_secrets_patched(fields.len());
    info!(fields = ?fields, "Patched secret");
    Ok(ReconcileOutcome::Patched(fields))
}
