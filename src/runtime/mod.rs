//! # Runtime
//!
//! Process lifecycle of the controller.
//!
//! - `initialization`: client, configuration, stores and queue setup
//! - `watch_loop`: SecretClaim watch feeding the queue, periodic resync
//! - `worker`: single consumer reconciling queued keys
//! - `error_policy`: retry handling per reconciliation result
//!
//! Shutdown on SIGINT/SIGTERM: readiness drops, the watch stops, the queue is
//! shut down and the worker finishes the keys still queued before exiting.

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
pub mod worker;

use crate::config::ControllerArgs;
use crate::controller::server::start_server;
use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Run the controller until a shutdown signal or a fatal error
///
/// # Errors
///
/// Returns an error if initialization fails or the worker hit a fatal error.
pub async fn run(args: ControllerArgs) -> Result<()> {
    let init = initialization::initialize(&args).await?;
    let queue = init.queue.clone();
    let server_state = init.server_state.clone();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = {
        let state = server_state.clone();
        let port = init.config.metrics_port;
        let mut rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let shutdown = async move {
                let _ = rx.changed().await;
            };
            if let Err(e) = start_server(port, state, shutdown).await {
                error!("HTTP server error: {}", e);
            }
        })
    };

    let watch = tokio::spawn(watch_loop::run_watch_loop(
        init.claims.clone(),
        queue.clone(),
        server_state.clone(),
        init.config.resync_interval(),
        shutdown_rx,
    ));

    let mut worker = tokio::spawn(worker::process_queue_items(
        queue.clone(),
        init.reconciler.clone(),
    ));

    let early_exit = tokio::select! {
        () = shutdown_signal() => {
            info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
            None
        }
        result = &mut worker => Some(result),
    };

    server_state.set_ready(false);
    let _ = shutdown_tx.send(true);
    queue.shut_down();

    let worker_result = match early_exit {
        Some(result) => result,
        None => worker.await,
    };
    if let Err(e) = watch.await {
        warn!("Watch loop task failed: {}", e);
    }
    if let Err(e) = server.await {
        warn!("HTTP server task failed: {}", e);
    }

    worker_result
        .context("Worker task panicked")?
        .context("Controller stopped after a fatal reconciliation error")?;
    info!("Controller stopped gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
