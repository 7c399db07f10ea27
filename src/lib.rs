//! Generic Secrets Controller Library
//!
//! This library provides the core functionality for the Generic Secrets Controller:
//! turning `SecretClaim` resources into Kubernetes Secrets holding fixed values,
//! random tokens or X.509 certificate/key pairs.
//!
//! ## Quick Start
//!
//! ```rust
//! use generic_secrets_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod issuer;
pub mod jsonpatch;
pub mod observability;
pub mod prelude;
pub mod random;
pub mod runtime;
pub mod store;
