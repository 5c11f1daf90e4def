//! Application orchestrator: wires the relay components together.

use std::sync::Arc;
use std::time::Duration;

use filedrop_relay_server::{ConnectionRegistry, RelayServer, ServerConfig};
use filedrop_transfer::{FileStore, LifecycleEvent, SessionStore, TransferEngine};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::handler::TransferHandler;

/// Runs the relay until Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    // -- Transfer engine --
    let files = FileStore::new(&config.uploads_dir);
    files.ensure_root().await?;
    let store = Arc::new(SessionStore::new());
    let engine = Arc::new(TransferEngine::new(config.engine_config(), store, files));

    // -- WS server --
    let registry = Arc::new(ConnectionRegistry::new());
    let handler = Arc::new(TransferHandler::new(
        Arc::clone(&engine),
        Arc::clone(&registry),
    ));
    let server = RelayServer::new(ServerConfig { port: config.port }, handler, registry);
    let server_run = Arc::clone(&server);
    let server_task = tokio::spawn(async move { server_run.run().await });

    // -- Background tasks --
    spawn_event_log(&engine, cancel.clone());
    match config.idle_sweep() {
        Some((max_idle, every)) => {
            spawn_idle_sweep(Arc::clone(&engine), max_idle, every, cancel.clone());
        }
        None => tracing::info!("idle sweep disabled"),
    }

    tracing::info!("relay ready");

    // -- Main loop: wait for shutdown --
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, shutting down");
        }
        result = server_task => {
            // The server only returns on its own when it fails to start.
            cancel.cancel();
            result??;
            return Ok(());
        }
    }

    // -- Graceful shutdown --
    tracing::info!("stopping services...");
    cancel.cancel();
    server.shutdown();
    let dropped = engine.shutdown().await;
    if dropped > 0 {
        tracing::warn!(dropped, "in-flight uploads discarded");
    }

    Ok(())
}

/// Periodically expires uploads that stopped sending chunks.
fn spawn_idle_sweep(
    engine: Arc<TransferEngine>,
    max_idle: Duration,
    every: Duration,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let expired = engine.sweep_idle(max_idle).await;
                    if expired > 0 {
                        tracing::info!(expired, "idle sweep expired uploads");
                    }
                }
            }
        }
    });
}

/// Logs session lifecycle events at debug level.
fn spawn_event_log(engine: &TransferEngine, cancel: CancellationToken) {
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => log_event(&event),
                    Err(RecvError::Lagged(missed)) => {
                        tracing::debug!(missed, "event log lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    });
}

fn log_event(event: &LifecycleEvent) {
    match event {
        LifecycleEvent::Created {
            transfer_id,
            owner,
            declared_size,
            ..
        } => tracing::debug!(%transfer_id, %owner, declared_size, "session created"),
        LifecycleEvent::Progressed {
            transfer_id,
            received_bytes,
            total_bytes,
        } => tracing::trace!(%transfer_id, received_bytes, total_bytes, "session progressed"),
        LifecycleEvent::Completed {
            transfer_id,
            storage_file_name,
            size,
        } => tracing::debug!(%transfer_id, %storage_file_name, size, "session completed"),
        LifecycleEvent::Cancelled {
            transfer_id,
            reason,
        } => tracing::debug!(%transfer_id, ?reason, "session cancelled"),
        LifecycleEvent::Failed {
            transfer_id,
            reason,
        } => tracing::debug!(%transfer_id, %reason, "session failed"),
    }
}
