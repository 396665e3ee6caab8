pub mod error;
pub mod game;
pub mod ledger;
pub mod query;
pub mod ws;

pub use error::{ErrorBody, ErrorCode, ErrorKind};
pub use game::{
    CompletionReason, MatchOutcome, MatchStatus, MatchView, Marker, MoveView, ParticipantAddress,
    SettlementState,
};
pub use ledger::{
    ConfirmationReceipt, LedgerAck, LedgerConfirmation, PreStakeRefundRequest, SettlementRequest,
    SettlementResult,
};
pub use query::{HealthResponse, QueueDepth, StatsResponse};
pub use ws::{ClientMessage, ServerMessage};
