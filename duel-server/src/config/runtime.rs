//! Runtime configuration re-exports.
//!
//! The validated types live in `duel-core::config`; this module re-exports
//! them for convenience.

pub use duel_core::config::{LedgerConfig, MatchmakingConfig, ServerConfig, SharedConfig};
