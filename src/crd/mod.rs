//! # Custom Resource Definitions
//!
//! CRD types for the generic secrets controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `SecretClaim` specification and its X.509 sub-spec
//! - `status.rs` - Status reported on the claim

mod spec;
mod status;

pub use spec::{SecretClaim, SecretClaimSpec, X509Claim};
pub use status::SecretClaimStatus;

/// API group of the SecretClaim CRD
pub const GROUP: &str = "dolansoft.org";
/// API version of the SecretClaim CRD
pub const VERSION: &str = "v1beta1";
/// Kind of the SecretClaim CRD
pub const KIND: &str = "SecretClaim";
