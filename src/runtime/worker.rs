//! # Worker
//!
//! The single consumer of the work queue. Keys are reconciled one at a time,
//! so no two reconciliations ever run concurrently.

use super::error_policy::handle_reconciliation_result;
use crate::controller::queue::EventQueue;
use crate::controller::reconciler::{Reconciler, ReconcilerError};
use std::sync::Arc;
use tracing::info;

/// Drain the queue until it is shut down and empty
///
/// # Errors
///
/// Returns the first fatal reconciliation error; the queue is shut down first.
pub async fn process_queue_items(
    queue: EventQueue,
    reconciler: Arc<Reconciler>,
) -> Result<(), ReconcilerError> {
    info!("Worker started");
    while let Some(key) = queue.get().await {
        let result = reconciler.reconcile(&key).await;
        let handled = handle_reconciliation_result(&queue, &key, result);
        queue.done(&key);
        if let Err(e) = handled {
            queue.shut_down();
            return Err(e);
        }
    }
    info!("Worker stopped, queue drained");
    Ok(())
}
