//! Duel Server
//!
//! Pairs players who stake the same amount, referees their match, and asks
//! the ledger bridge to settle the result.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::ConfigLoader;
use duel_core::coordinator::Coordinator;
use duel_core::events::{coordinator_event_channel, ledger_job_channel};
use duel_core::processors::{
    CoordinatorHandle, CoordinatorService, HttpLedgerGateway, LedgerGateway, LoggingLedgerGateway,
    SettlementDispatcher,
};
use duel_core::rules::TicTacToe;
use server::{build_router, run_server};
use shutdown::spawn_config_reload_handler;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Duel - stake-backed two-player match coordinator
#[derive(Parser, Debug)]
#[command(name = "duel-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "DUEL_CONFIG", default_value = "./duel-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting duel-server v{}", env!("CARGO_PKG_VERSION"));

    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    let listen_addr = loaded_config.server.listen;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let shared_config = loaded_config.into_shared();
    let matchmaking = shared_config.matchmaking.snapshot().await;
    let ledger = shared_config.ledger.read().await.clone();

    let gateway: Arc<dyn LedgerGateway> = match ledger.endpoint.clone() {
        Some(endpoint) => {
            tracing::info!(%endpoint, "Using ledger bridge");
            Arc::new(HttpLedgerGateway::new(
                endpoint,
                shared_config.ledger.clone(),
                ledger.request_timeout,
            ))
        }
        None => {
            tracing::warn!("No ledger endpoint configured; settlement requests will only be logged");
            Arc::new(LoggingLedgerGateway)
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (event_tx, event_rx) = coordinator_event_channel();
    let (job_tx, job_rx) = ledger_job_channel();

    let coordinator = Coordinator::new(Arc::new(TicTacToe), matchmaking, job_tx);
    let service_task = tokio::spawn(CoordinatorService::new(coordinator).run(
        shutdown_rx.clone(),
        event_rx,
        shared_config.matchmaking.clone(),
        shared_config.matchmaking.subscribe(),
    ));
    let dispatcher = SettlementDispatcher::new(gateway, event_tx.clone(), ledger.request_timeout);
    let dispatcher_task = tokio::spawn(dispatcher.run(shutdown_rx, job_rx));

    let state = AppState::new(CoordinatorHandle::new(event_tx), shared_config.clone());

    // Spawn config reload handler (listens for SIGHUP)
    let reload_notify = spawn_config_reload_handler(shared_config, config_loader);

    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    reload_notify.notify_one();
    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(service_task, dispatcher_task);
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
