//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! Kubernetes client setup and wiring of the stores, issuer, queue and reconciler.

use crate::config::{ControllerArgs, ControllerConfig};
use crate::controller::backoff::{ItemExponentialBackoff, OverallRateLimiter};
use crate::controller::queue::EventQueue;
use crate::controller::reconciler::Reconciler;
use crate::controller::server::ServerState;
use crate::crd::SecretClaim;
use crate::issuer::CredentialIssuer;
use crate::observability;
use crate::random::OsRandom;
use crate::store::{KubeClaimStore, KubeSecretStore};
use anyhow::{anyhow, Context, Result};
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything the controller needs to run
pub struct InitializationResult {
    /// Effective configuration (environment overlaid with flags)
    pub config: ControllerConfig,
    /// API for SecretClaims, scoped to the watched namespace
    pub claims: Api<SecretClaim>,
    /// Reconciler context
    pub reconciler: Arc<Reconciler>,
    /// Work queue fed by the watch loop and drained by the worker
    pub queue: EventQueue,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("config", &self.config)
            .field("server_ready", &self.server_state.is_ready())
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - Kubernetes client creation
/// - Checking that the SecretClaim CRD is installed
/// - Reconciler and queue setup
///
/// # Errors
///
/// Returns an error if logging, metrics or the Kubernetes client cannot be set up.
pub async fn initialize(args: &ControllerArgs) -> Result<InitializationResult> {
    // Must happen before any TLS connection is made
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }

    let mut config = ControllerConfig::from_env();
    args.apply_to(&mut config);

    observability::logging::init_tracing(&config.log_level, config.log_format)
        .map_err(|e| anyhow!("Failed to initialize tracing: {e}"))?;

    info!("Starting Generic Secrets Controller");
    info!(
        "Build info: datetime={}, git_hash={}",
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    debug!(?config, "Loaded configuration");

    observability::metrics::register_metrics()?;

    let client = create_client(args).await?;

    let claims: Api<SecretClaim> = match &config.watch_namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    };
    ensure_crd_installed(&claims).await?;

    let issuer = CredentialIssuer::new(config.cluster_domain.clone(), Arc::new(OsRandom));
    let reconciler = Arc::new(Reconciler::new(
        Arc::new(KubeClaimStore::new(client.clone())),
        Arc::new(KubeSecretStore::new(client, config.field_manager.clone())),
        issuer,
    ));

    let overall = OverallRateLimiter::new(config.rate_limit_qps, config.rate_limit_burst)
        .context("Invalid requeue rate limit")?;
    let queue = EventQueue::with_overall_limit(
        Arc::new(ItemExponentialBackoff::new(
            config.backoff_start_duration(),
            config.backoff_max_duration(),
        )),
        Some(Arc::new(overall)),
    );

    info!(
        namespace = config.watch_namespace.as_deref().unwrap_or("<all>"),
        cluster_domain = %config.cluster_domain,
        field_manager = %config.field_manager,
        "Controller initialized, starting watch loop..."
    );

    Ok(InitializationResult {
        config,
        claims,
        reconciler,
        queue,
        server_state: Arc::new(ServerState::default()),
    })
}

/// Client from `--kubeconfig`/`--master`, falling back to in-cluster or default kubeconfig
async fn create_client(args: &ControllerArgs) -> Result<Client> {
    let mut kube_config = match &args.kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("Failed to load kubeconfig")?
        }
        None => kube::Config::infer()
            .await
            .context("Failed to infer Kubernetes configuration")?,
    };

    if let Some(master) = &args.master {
        kube_config.cluster_url = master
            .parse()
            .with_context(|| format!("Invalid --master URL '{master}'"))?;
    }

    Client::try_from(kube_config).context("Failed to create Kubernetes client")
}

/// Fail fast with a readable error when the CRD is missing or not readable
async fn ensure_crd_installed(claims: &Api<SecretClaim>) -> Result<()> {
    let list = claims
        .list(&ListParams::default().limit(1))
        .await
        .context("SecretClaim CRD is not queryable; is it installed? (see `crdgen`)")?;
    info!(
        "CRD is queryable, found {} SecretClaim resource(s) in the first page",
        list.items.len()
    );
    Ok(())
}
