//! Runtime configuration for the duel coordinator.
//!
//! These are the validated values the core runs with. Reading and validating
//! the TOML file is the server crate's job.

mod config_store;
mod ledger;
mod matchmaking;
mod server;

pub use config_store::{ConfigStore, ConfigWatcher};
pub use ledger::LedgerConfig;
pub use matchmaking::MatchmakingConfig;
pub use server::ServerConfig;

use std::sync::Arc;
use tokio::sync::RwLock;

/// Configuration sections shared between the server and the processors.
///
/// Matchmaking timings go through a [`ConfigStore`] so the coordinator
/// service is notified on reload; the ledger section is read on demand.
#[derive(Clone)]
pub struct SharedConfig {
    pub server: Arc<RwLock<ServerConfig>>,
    pub matchmaking: ConfigStore<MatchmakingConfig>,
    pub ledger: Arc<RwLock<LedgerConfig>>,
}

impl SharedConfig {
    pub fn new(server: ServerConfig, matchmaking: MatchmakingConfig, ledger: LedgerConfig) -> Self {
        Self {
            server: Arc::new(RwLock::new(server)),
            matchmaking: ConfigStore::new(matchmaking),
            ledger: Arc::new(RwLock::new(ledger)),
        }
    }
}
