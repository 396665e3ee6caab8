//! TOML file configuration structures.
//!
//! These structs directly map to the `duel-config.toml` file format.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub matchmaking: MatchmakingConfig,
    pub ledger: LedgerConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Matchmaking timings, all in whole seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingConfig {
    /// How long a declared intent may wait before it expires.
    pub pre_commitment_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// How long a completed match stays queryable.
    pub completed_retention_secs: u64,
    /// Per-session outbound message queue capacity.
    pub outbound_buffer: usize,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            pre_commitment_ttl_secs: 300,
            sweep_interval_secs: 30,
            completed_retention_secs: 60,
            outbound_buffer: 64,
        }
    }
}

/// Ledger bridge section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Base URL of the bridge. Settlement requests are only logged without one.
    #[serde(default)]
    pub endpoint: Option<Url>,
    /// Shared HMAC secret.
    pub secret: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    10
}
