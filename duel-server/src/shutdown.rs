//! Signal handling for graceful shutdown and config reload.

use crate::config::ConfigLoader;
use duel_core::config::SharedConfig;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::Notify;

/// Creates a future that completes when a shutdown signal is received.
///
/// Listens for SIGTERM and SIGINT (Ctrl+C).
pub async fn shutdown_signal() {
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
}

/// Spawns a task that listens for SIGHUP and reloads the configuration.
///
/// Matchmaking timings go through the `ConfigStore`, which wakes the
/// coordinator service. The ledger secret is swapped in place; the listen
/// address, ledger endpoint and request timeout need a restart.
///
/// Returns a Notify used to stop the handler.
pub fn spawn_config_reload_handler(
    config: SharedConfig,
    config_loader: Arc<ConfigLoader>,
) -> Arc<Notify> {
    let shutdown_notify = Arc::new(Notify::new());
    let shutdown_notify_clone = shutdown_notify.clone();

    tokio::spawn(async move {
        let mut sighup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");

        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    tracing::info!("Received SIGHUP, reloading configuration");
                    match config_loader.reload() {
                        Ok(loaded) => {
                            if config.server.read().await.listen != loaded.server.listen {
                                tracing::warn!(
                                    listen = %loaded.server.listen,
                                    "Listen address changed; restart to apply"
                                );
                            }

                            config.matchmaking.update(loaded.matchmaking).await;

                            let mut ledger = config.ledger.write().await;
                            if ledger.endpoint != loaded.ledger.endpoint
                                || ledger.request_timeout != loaded.ledger.request_timeout
                            {
                                tracing::warn!("Ledger endpoint or timeout changed; restart to apply");
                            }
                            ledger.secret = loaded.ledger.secret;
                            drop(ledger);

                            tracing::info!("Configuration reloaded successfully");
                        }
                        Err(e) => {
                            tracing::error!("Failed to reload configuration: {}", e);
                        }
                    }
                }
                _ = shutdown_notify_clone.notified() => {
                    tracing::debug!("Config reload handler shutting down");
                    break;
                }
            }
        }
    });

    shutdown_notify
}
