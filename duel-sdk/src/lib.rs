//! Shared wire types for Duel.
//!
//! Used by the coordinator server, player frontends and the ledger bridge.
//! The typed clients live behind the `client` feature.

#[cfg(feature = "client")]
pub mod client;
pub mod objects;
pub mod signature;
