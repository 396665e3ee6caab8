//! Event channel factories and handles.

use super::types::{CoordinatorEvent, LedgerJob};
use tokio::sync::mpsc;

/// Default buffer size for event channels.
///
/// This provides enough buffer to handle bursts while keeping memory bounded.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for CoordinatorEvent events.
pub type CoordinatorEventSender = mpsc::Sender<CoordinatorEvent>;
/// Receiver handle for CoordinatorEvent events.
pub type CoordinatorEventReceiver = mpsc::Receiver<CoordinatorEvent>;

/// Sender handle for LedgerJob events.
pub type LedgerJobSender = mpsc::Sender<LedgerJob>;
/// Receiver handle for LedgerJob events.
pub type LedgerJobReceiver = mpsc::Receiver<LedgerJob>;

/// Create the coordinator's inbound event channel.
///
/// Every transport task, the ledger endpoint and the settlement dispatcher
/// hold a clone of the sender; the coordinator service owns the receiver.
pub fn coordinator_event_channel() -> (CoordinatorEventSender, CoordinatorEventReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create the channel from the coordinator to the settlement dispatcher.
///
/// The coordinator only ever uses `try_send` on it, so a full queue is
/// reported as a failed request instead of stalling the coordinator.
pub fn ledger_job_channel() -> (LedgerJobSender, LedgerJobReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
