//! # Command-line Flags
//!
//! Flags accepted by the controller binary. Anything given here wins over the
//! matching environment variable.

use crate::config::ControllerConfig;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "generic-secrets-controller",
    about = "Materializes SecretClaim resources into Kubernetes Secrets",
    version
)]
pub struct ControllerArgs {
    /// Path to a kubeconfig. Only required if out-of-cluster.
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// The address of the Kubernetes API server. Overrides any value in kubeconfig.
    /// Only required if out-of-cluster.
    #[arg(long)]
    pub master: Option<String>,

    /// Kubernetes DNS cluster domain (default cluster.local)
    #[arg(long)]
    pub cluster_domain: Option<String>,

    /// Port for the metrics and probe server
    #[arg(long)]
    pub metrics_port: Option<u16>,

    /// Only watch SecretClaims in this namespace
    #[arg(long)]
    pub namespace: Option<String>,
}

impl ControllerArgs {
    /// Overlay the flags that were given onto an environment-derived config
    pub fn apply_to(&self, config: &mut ControllerConfig) {
        if let Some(domain) = &self.cluster_domain {
            config.cluster_domain.clone_from(domain);
        }
        if let Some(port) = self.metrics_port {
            config.metrics_port = port;
        }
        if let Some(namespace) = &self.namespace {
            config.watch_namespace = Some(namespace.clone());
        }
    }
}
