//! # Controller
//!
//! Core controller modules for the generic secrets controller.
//!
//! - `backoff`: per-key exponential backoff and overall rate limiting for requeues
//! - `queue`: deduplicating work queue between the watch feed and the worker
//! - `reconciler`: core reconciliation logic
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod queue;
pub mod reconciler;
pub mod server;
