//! Event system for the coordinator.
//!
//! # Event Flow
//!
//! 1. Transport tasks and the ledger endpoint emit `CoordinatorEvent` ->
//!    `CoordinatorService`
//! 2. `CoordinatorService` emits `LedgerJob` -> `SettlementDispatcher`
//! 3. `SettlementDispatcher` reports `CoordinatorEvent::LedgerFinished` back
//!    to the `CoordinatorService`
//!
//! Notifications to players leave the coordinator through each session's
//! outbound queue (see [`crate::registry`]).

pub mod channels;
pub mod types;

pub use channels::{
    coordinator_event_channel, ledger_job_channel, CoordinatorEventReceiver,
    CoordinatorEventSender, LedgerJobReceiver, LedgerJobSender, DEFAULT_CHANNEL_BUFFER,
};

pub use types::{CoordinatorEvent, CoordinatorQuery, LedgerJob};
