//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use generic_secrets_controller::prelude::*;
//! ```
//!
//! This brings into scope:
//! - CRD types (SecretClaim, SecretClaimSpec, X509Claim)
//! - Store traits, plus the in-memory store with the `test-util` feature
//! - Reconciler types (Reconciler, ReconcilerError, ErrorKind, ReconcileOutcome)
//! - Config types (ControllerConfig, ControllerArgs)

// CRD types - most commonly used
pub use crate::crd::*;

// Store traits - needed for plugging in another backend
pub use crate::store::{ClaimStore, SecretData, SecretStore, StoreError};
#[cfg(any(test, feature = "test-util"))]
pub use crate::store::InMemoryStore;

// Reconciler types - core controller functionality
pub use crate::controller::queue::EventQueue;
pub use crate::controller::reconciler::{
    ErrorKind, ReconcileOutcome, Reconciler, ReconcilerError,
};

// Issuance
pub use crate::issuer::{CredentialIssuer, IssueError};
pub use crate::random::{OsRandom, SecureRandom};
#[cfg(any(test, feature = "test-util"))]
pub use crate::random::SeededRandom;

// Config types - for configuration management
pub use crate::config::{ControllerArgs, ControllerConfig};
