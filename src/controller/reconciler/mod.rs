//! # Reconciler
//!
//! Core reconciliation logic for `SecretClaim` resources.
//!
//! The reconciler:
//! - Loads the claim and its Secret (same namespace and name)
//! - Creates the Secret with the full payload when it does not exist yet
//! - Patches changed fixed fields and missing token fields of plain Secrets
//! - Leaves Secrets of X.509 claims alone once issued
//!
//! ## Reconciliation Flow
//!
//! 1. Split the queue key into namespace and name
//! 2. Get the claim (gone: done)
//! 3. Get the Secret
//! 4. Create, patch or skip (see `reconcile.rs`)

pub mod diff;
pub mod reconcile;
pub mod types;

// Re-export public API
pub use reconcile::{claim_key, split_key};
pub use types::{ErrorKind, ReconcileOutcome, Reconciler, ReconcilerError};
