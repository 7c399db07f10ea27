//! # Configuration
//!
//! Controller configuration loaded from environment variables, with
//! command-line flags layered on top.
//!
//! - `controller.rs` - `ControllerConfig` and its environment defaults
//! - `args.rs` - `clap` flags that override the environment

mod args;
mod controller;

pub use args::ControllerArgs;
pub use controller::{ControllerConfig, LogFormat};
