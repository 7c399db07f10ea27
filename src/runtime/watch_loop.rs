//! # Watch Loop
//!
//! Single producer feeding the work queue: watches SecretClaims and enqueues
//! the key of every claim that is added or changed.
//!
//! The watch is wrapped in a reflector so the periodic resync can re-enqueue
//! every known claim without listing the API again.

use crate::controller::queue::EventQueue;
use crate::controller::reconciler::claim_key;
use crate::controller::server::ServerState;
use crate::crd::SecretClaim;
use futures::StreamExt;
use kube::api::Api;
use kube_runtime::reflector::{self, Store};
use kube_runtime::{watcher, WatchStreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Apply one watch event to the queue
pub fn handle_event(queue: &EventQueue, server_state: &ServerState, event: watcher::Event<SecretClaim>) {
    match event {
        watcher::Event::Apply(claim) | watcher::Event::InitApply(claim) => match claim_key(&claim) {
            Some(key) => {
                debug!(key = %key, "Claim changed, enqueueing");
                queue.add(key);
            }
            None => warn!("Ignoring SecretClaim event without namespace or name"),
        },
        watcher::Event::Delete(claim) => {
            // The Secret is removed by garbage collection through its owner reference
            info!(
                key = claim_key(&claim).as_deref().unwrap_or("<unknown>"),
                "Claim deleted"
            );
        }
        watcher::Event::Init => debug!("Watch (re)listing claims"),
        watcher::Event::InitDone => {
            if !server_state.is_ready() {
                info!("Initial claim list processed, controller is ready");
            }
            server_state.set_ready(true);
        }
    }
}

/// Enqueue every cached claim
pub fn resync(queue: &EventQueue, store: &Store<SecretClaim>) -> usize {
    let mut count = 0;
    for claim in store.state() {
        if let Some(key) = claim_key(&claim) {
            queue.add(key);
            count += 1;
        }
    }
    count
}

async fn run_resync(
    queue: EventQueue,
    store: Store<SecretClaim>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; the initial list already enqueues everything
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let count = resync(&queue, &store);
                debug!(claims = count, "Resync enqueued cached claims");
            }
        }
    }
}

/// Run the watch until shutdown is signalled
///
/// Watch errors are retried by the watcher's own backoff; the loop only ends
/// on shutdown or if the stream terminates.
#[tracing::instrument(name = "controller.watch", skip_all)]
pub async fn run_watch_loop(
    claims: Api<SecretClaim>,
    queue: EventQueue,
    server_state: Arc<ServerState>,
    resync_interval: Option<Duration>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (reader, writer) = reflector::store::<SecretClaim>();
    let stream = reflector::reflector(writer, watcher(claims, watcher::Config::default()))
        .default_backoff();
    let mut stream = std::pin::pin!(stream);

    let resync_task = resync_interval.map(|interval| {
        info!(interval_secs = interval.as_secs(), "Periodic resync enabled");
        tokio::spawn(run_resync(queue.clone(), reader.clone(), interval, shutdown.clone()))
    });

    info!("Starting controller watch loop...");
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("Shutdown requested, exiting watch loop");
                break;
            }
            event = stream.next() => match event {
                Some(Ok(event)) => handle_event(&queue, &server_state, event),
                Some(Err(e)) => warn!(error = %e, "Watch stream error, retrying with backoff"),
                None => {
                    warn!("Controller watch stream ended");
                    break;
                }
            }
        }
    }

    if let Some(task) = resync_task {
        task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::backoff::ItemExponentialBackoff;
    use crate::crd::SecretClaimSpec;

    fn queue() -> EventQueue {
        EventQueue::new(Arc::new(ItemExponentialBackoff::new(
            Duration::from_millis(5),
            Duration::from_secs(1),
        )))
    }

    fn claim(namespace: &str, name: &str) -> SecretClaim {
        let mut claim = SecretClaim::new(name, SecretClaimSpec::default());
        claim.metadata.namespace = Some(namespace.to_string());
        claim
    }

    #[tokio::test]
    async fn test_apply_events_enqueue_and_collapse() {
        let q = queue();
        let state = ServerState::default();
        handle_event(&q, &state, watcher::Event::InitApply(claim("ns", "a")));
        handle_event(&q, &state, watcher::Event::Apply(claim("ns", "a")));
        handle_event(&q, &state, watcher::Event::Apply(claim("ns", "b")));
        assert_eq!(q.len(), 2);
        assert_eq!(q.get().await.as_deref(), Some("ns/a"));
    }

    #[test]
    fn test_delete_does_not_enqueue() {
        let q = queue();
        let state = ServerState::default();
        handle_event(&q, &state, watcher::Event::Delete(claim("ns", "a")));
        assert!(q.is_empty());
    }

    #[test]
    fn test_init_done_marks_ready() {
        let q = queue();
        let state = ServerState::default();
        handle_event(&q, &state, watcher::Event::Init);
        assert!(!state.is_ready());
        handle_event(&q, &state, watcher::Event::InitDone);
        assert!(state.is_ready());
    }

    #[test]
    fn test_resync_enqueues_cached_claims() {
        let q = queue();
        let (reader, mut writer) = reflector::store::<SecretClaim>();
        writer.apply_watcher_event(&watcher::Event::Apply(claim("ns", "a")));
        writer.apply_watcher_event(&watcher::Event::Apply(claim("other", "b")));
        assert_eq!(resync(&q, &reader), 2);
        assert_eq!(q.len(), 2);
    }
}
