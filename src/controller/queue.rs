//! # Event Queue
//!
//! Deduplicating, rate-limited work queue between the watch feed and the worker.
//!
//! A key is in at most one of three states:
//!
//! - queued: waiting to be handed out by `get`
//! - processing: handed out, not yet `done`
//! - dirty: added while processing; queued again when `done` is called
//!
//! Adding a key that is already queued is a no-op, so a burst of watch events
//! for one claim results in a single reconciliation. A key is never handed out
//! twice at the same time.

use super::backoff::{OverallRateLimiter, RateLimiter};
use crate::observability::metrics;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Default)]
struct QueueState {
    queue: VecDeque<String>,
    dirty: HashSet<String>,
    processing: HashSet<String>,
    shutting_down: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<QueueState>,
    notify: Notify,
    rate_limiter: Arc<dyn RateLimiter>,
    overall: Option<Arc<OverallRateLimiter>>,
}

/// Work queue of `namespace/name` keys
///
/// Cloning is cheap; clones share the same queue.
#[derive(Debug, Clone)]
pub struct EventQueue {
    shared: Arc<Shared>,
}

impl EventQueue {
    /// Queue whose retries are delayed by `rate_limiter` only
    #[must_use]
    pub fn new(rate_limiter: Arc<dyn RateLimiter>) -> Self {
        Self::with_overall_limit(rate_limiter, None)
    }

    /// Queue whose retries also wait for a token of the shared `overall` limiter
    #[must_use]
    pub fn with_overall_limit(
        rate_limiter: Arc<dyn RateLimiter>,
        overall: Option<Arc<OverallRateLimiter>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                notify: Notify::new(),
                rate_limiter,
                overall,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Queue state stays consistent even if a holder panicked
        match self.shared.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Mark `key` as needing processing
    pub fn add(&self, key: impl Into<String>) {
        let key = key.into();
        let mut state = self.lock();
        if state.shutting_down || state.dirty.contains(&key) {
            return;
        }
        state.dirty.insert(key.clone());
        if state.processing.contains(&key) {
            // Picked up again by `done`
            return;
        }
        state.queue.push_back(key);
        metrics::set_queue_depth(state.queue.len());
        drop(state);
        self.shared.notify.notify_one();
    }

    /// Wait for the next key
    ///
    /// Returns `None` once the queue is shut down and every queued key has
    /// been handed out. The caller must call `done` with the returned key.
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.processing.insert(key.clone());
                    state.dirty.remove(&key);
                    metrics::set_queue_depth(state.queue.len());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Finish processing `key`; requeues it if it was added in the meantime
    pub fn done(&self, key: &str) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) {
            state.queue.push_back(key.to_string());
            metrics::set_queue_depth(state.queue.len());
            drop(state);
            self.shared.notify.notify_one();
        }
    }

    /// Add `key` once `delay` has passed
    pub fn add_after(&self, key: impl Into<String>, delay: Duration) {
        let key = key.into();
        if self.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Add `key` after its backoff delay and, if configured, an overall token
    pub fn add_rate_limited(&self, key: &str) {
        let delay = self.shared.rate_limiter.when(key);
        debug!(key = %key, delay_ms = delay.as_millis(), "Requeueing with backoff");
        metrics::increment_requeues();
        let Some(overall) = self.shared.overall.clone() else {
            self.add_after(key.to_string(), delay);
            return;
        };
        if self.is_shutting_down() {
            return;
        }
        let queue = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::join!(tokio::time::sleep(delay), overall.until_ready());
            queue.add(key);
        });
    }

    /// Reset the rate limiter's backoff for `key`
    pub fn forget(&self, key: &str) {
        self.shared.rate_limiter.forget(key);
    }

    /// Times `key` was requeued since it was last forgotten
    #[must_use]
    pub fn num_requeues(&self, key: &str) -> u32 {
        self.shared.rate_limiter.num_requeues(key)
    }

    /// Keys waiting to be handed out
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting keys; `get` drains what is queued, then returns `None`
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.shared.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::backoff::ItemExponentialBackoff;

    fn queue() -> EventQueue {
        EventQueue::new(Arc::new(ItemExponentialBackoff::new(
            Duration::from_millis(5),
            Duration::from_secs(1000),
        )))
    }

    #[tokio::test]
    async fn test_duplicates_collapse_while_queued() {
        let q = queue();
        q.add("ns/a");
        q.add("ns/b");
        q.add("ns/a");
        assert_eq!(q.len(), 2);
        assert_eq!(q.get().await.as_deref(), Some("ns/a"));
        assert_eq!(q.get().await.as_deref(), Some("ns/b"));
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_key_added_while_processing_is_requeued_on_done() {
        let q = queue();
        q.add("ns/a");
        let key = q.get().await.unwrap();
        q.add("ns/a");
        // Not handed out twice concurrently
        assert!(q.is_empty());
        q.done(&key);
        assert_eq!(q.len(), 1);
        assert_eq!(q.get().await.as_deref(), Some("ns/a"));
        q.done("ns/a");
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_get_waits_for_add() {
        let q = queue();
        let waiter = {
            let q = q.clone();
            tokio::spawn(async move { q.get().await })
        };
        tokio::task::yield_now().await;
        q.add("ns/late");
        assert_eq!(waiter.await.unwrap().as_deref(), Some("ns/late"));
    }

    #[tokio::test]
    async fn test_shut_down_drains_then_stops() {
        let q = queue();
        q.add("ns/a");
        q.add("ns/b");
        q.shut_down();
        q.add("ns/ignored");
        assert_eq!(q.get().await.as_deref(), Some("ns/a"));
        assert_eq!(q.get().await.as_deref(), Some("ns/b"));
        assert_eq!(q.get().await, None);
    }

    #[tokio::test]
    async fn test_shut_down_wakes_blocked_get() {
        let q = queue();
        let waiter = {
            let q = q.clone();
            tokio::spawn(async move { q.get().await })
        };
        tokio::task::yield_now().await;
        q.shut_down();
        assert_eq!(waiter.await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_rate_limited_backs_off() {
        let q = EventQueue::with_overall_limit(
            Arc::new(ItemExponentialBackoff::new(
                Duration::from_millis(5),
                Duration::from_secs(1000),
            )),
            Some(Arc::new(OverallRateLimiter::new(10.0, 100).unwrap())),
        );
        let start = tokio::time::Instant::now();
        q.add_rate_limited("ns/a");
        assert!(q.is_empty());
        assert_eq!(q.get().await.as_deref(), Some("ns/a"));
        assert!(start.elapsed() >= Duration::from_millis(5));
        assert_eq!(q.num_requeues("ns/a"), 1);

        q.done("ns/a");
        q.add_rate_limited("ns/a");
        let before = tokio::time::Instant::now();
        assert_eq!(q.get().await.as_deref(), Some("ns/a"));
        assert!(before.elapsed() >= Duration::from_millis(10));
        assert_eq!(q.num_requeues("ns/a"), 2);

        q.forget("ns/a");
        assert_eq!(q.num_requeues("ns/a"), 0);
    }

    #[tokio::test]
    async fn test_overall_limit_holds_back_retries_of_different_keys() {
        let q = EventQueue::with_overall_limit(
            Arc::new(ItemExponentialBackoff::new(
                Duration::from_millis(1),
                Duration::from_millis(1),
            )),
            Some(Arc::new(OverallRateLimiter::new(0.1, 2).unwrap())),
        );
        q.add_rate_limited("ns/a");
        q.add_rate_limited("ns/b");
        q.add_rate_limited("ns/c");
        let mut released = vec![q.get().await.unwrap(), q.get().await.unwrap()];
        released.sort();
        assert_eq!(released, vec!["ns/a", "ns/b"]);
        // The bucket refills every ten seconds; per-key backoff alone would release ns/c now
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(q.is_empty());
        q.shut_down();
    }
}
