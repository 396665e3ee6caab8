//! Event type definitions.
//!
//! Every state change of the coordinator is driven by one of these events,
//! delivered over a single channel so mutations are serialized.

use crate::coordinator::CoordinatorError;
use crate::processors::ledger::LedgerError;
use crate::registry::{OutboundSender, SessionId};
use duel_sdk::objects::{
    ClientMessage, ConfirmationReceipt, LedgerAck, LedgerConfirmation, MatchView,
    PreStakeRefundRequest, SettlementRequest, StatsResponse,
};
use tokio::sync::oneshot;
use uuid::Uuid;

/// Input of the coordinator service.
#[derive(Debug)]
pub enum CoordinatorEvent {
    /// A transport connection opened.
    Connected {
        session: SessionId,
        sender: OutboundSender,
    },
    /// A transport connection closed. Delivered at most once per session by
    /// the transport, but handled idempotently.
    Disconnected { session: SessionId },
    /// A decoded message from a client, in arrival order per session.
    Client {
        session: SessionId,
        message: ClientMessage,
    },
    /// Signed confirmation from the ledger bridge.
    LedgerConfirmed {
        confirmation: LedgerConfirmation,
        reply: oneshot::Sender<Result<ConfirmationReceipt, CoordinatorError>>,
    },
    /// A ledger request finished, successfully or not.
    LedgerFinished {
        job: LedgerJob,
        result: Result<LedgerAck, LedgerError>,
    },
    Query(CoordinatorQuery),
}

/// Read-only requests answered from coordinator state.
#[derive(Debug)]
pub enum CoordinatorQuery {
    Stats {
        reply: oneshot::Sender<StatsResponse>,
    },
    Match {
        match_id: Uuid,
        reply: oneshot::Sender<Option<MatchView>>,
    },
}

/// Outbound request for the ledger bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerJob {
    Settlement(SettlementRequest),
    Refund(PreStakeRefundRequest),
}

impl LedgerJob {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerJob::Settlement(_) => "settlement",
            LedgerJob::Refund(_) => "refund",
        }
    }
}
