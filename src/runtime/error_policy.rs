//! # Error Policy
//!
//! What happens to a key after its reconciliation finished.
//!
//! - success: the key's backoff is reset
//! - not found: nothing left to do, backoff reset
//! - transient or malformed input: requeued with rate-limited backoff, forever
//! - fatal: the worker stops and the process exits with an error
//!
//! Malformed input is retried like a transient failure; the kind only shows up
//! in logs and in the error metric so operators can tell them apart.

use crate::controller::queue::EventQueue;
use crate::controller::reconciler::{ErrorKind, ReconcileOutcome, ReconcilerError};
use crate::observability;
use tracing::{debug, error, warn};

/// Apply the retry policy for `key`
///
/// # Errors
///
/// Returns the error back when it is fatal, which ends the worker.
pub fn handle_reconciliation_result(
    queue: &EventQueue,
    key: &str,
    result: Result<ReconcileOutcome, ReconcilerError>,
) -> Result<(), ReconcilerError> {
    let error = match result {
        Ok(outcome) => {
            debug!(key = %key, outcome = outcome.as_str(), "Reconciliation succeeded");
            queue.forget(key);
            return Ok(());
        }
        Err(error) => error,
    };

    let kind = error.kind();
    observability::metrics::increment_reconciliation_errors(kind.as_str());

    match kind {
        ErrorKind::NotFound => {
            debug!(key = %key, error = %error, "Claim vanished during reconciliation");
            queue.forget(key);
            Ok(())
        }
        ErrorKind::Transient | ErrorKind::MalformedInput => {
            warn!(
                key = %key,
                error.kind = %kind,
                error = %error,
                requeues = queue.num_requeues(key),
                "Reconciliation failed, requeueing with backoff"
            );
            queue.add_rate_limited(key);
            Ok(())
        }
        ErrorKind::Fatal => {
            error!(key = %key, error.kind = %kind, error = %error, "Fatal reconciliation error");
            Err(error)
        }
    }
}
