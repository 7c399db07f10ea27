//! # CRD Generator
//!
//! Generates the Kubernetes CustomResourceDefinition YAML for `SecretClaim`.
//!
//! ## Usage
//!
//! ```bash
//! # Generate CRD YAML
//! cargo run --bin crdgen > config/crd/secretclaim.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use generic_secrets_controller::crd::SecretClaim;
use kube::core::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crd = serde_yaml::to_string(&SecretClaim::crd())?;
    print!("{crd}");
    Ok(())
}
