//! # Generic Secrets Controller
//!
//! A Kubernetes controller that materializes `SecretClaim` resources into Secrets.
//!
//! ## Overview
//!
//! For every claim the controller owns a Secret of the same name and namespace:
//!
//! 1. **Plain claims** - fixed fields are copied verbatim and kept in sync, token
//!    fields get a random 128 bit hex token that is never regenerated
//! 2. **X.509 claims** - an ECDSA P-256 key and certificate, self-signed or signed
//!    by a CA stored in another Secret, written once
//!
//! Secrets carry an owner reference to their claim, so deleting a claim lets
//! Kubernetes garbage collection remove the Secret.
//!
//! ## Usage
//!
//! ```bash
//! generic-secrets-controller --kubeconfig ~/.kube/config
//! ```

use clap::Parser;
use generic_secrets_controller::config::ControllerArgs;
use generic_secrets_controller::runtime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ControllerArgs::parse();
    runtime::run(args).await
}
