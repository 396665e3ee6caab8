//! Match and board types.

use compact_str::CompactString;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable external identifier of a player (wallet/account address).
pub type ParticipantAddress = CompactString;

/// Cell marker. Participant A always plays `X` and moves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Marker {
    X,
    O,
}

impl Marker {
    /// The marker that moves after this one.
    pub fn opponent(self) -> Self {
        match self {
            Marker::X => Marker::O,
            Marker::O => Marker::X,
        }
    }
}

impl std::fmt::Display for Marker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Marker::X => write!(f, "X"),
            Marker::O => write!(f, "O"),
        }
    }
}

/// Lifecycle status of a match as tracked by the coordinator.
///
/// `Refunded` is decided by the ledger and never appears here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Created,
    Active,
    Completed,
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchStatus::Created => write!(f, "created"),
            MatchStatus::Active => write!(f, "active"),
            MatchStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Why a match reached `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// A marker completed a line.
    Line,
    /// The board filled up without a line.
    Draw,
    /// A participant forfeited explicitly.
    Forfeit,
    /// A participant's connection dropped during play.
    Disconnect,
    /// A pre-commitment expired before both stakes landed.
    Expired,
    /// A participant cancelled before both stakes landed.
    Cancelled,
}

/// Final result of a match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MatchOutcome {
    Winner {
        participant: ParticipantAddress,
        marker: Marker,
    },
    Draw,
    /// The match never became active; nothing to settle.
    Aborted,
}

/// Progress of the external settlement request for a completed match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementState {
    NotRequested,
    Pending,
    Acknowledged,
    Failed,
}

/// A single accepted move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveView {
    pub participant: ParticipantAddress,
    pub row: u8,
    pub col: u8,
    pub marker: Marker,
}

/// Full match snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchView {
    pub match_id: Uuid,
    pub participant_a: ParticipantAddress,
    pub participant_b: ParticipantAddress,
    pub stake_amount: Decimal,
    pub status: MatchStatus,
    pub rows: u8,
    pub cols: u8,
    /// Row-major cells, `null` when empty.
    pub board: Vec<Option<Marker>>,
    pub moves: Vec<MoveView>,
    pub staked_a: bool,
    pub staked_b: bool,
    /// Marker expected next, present only while the match is active.
    pub next_marker: Option<Marker>,
    pub external_ref: Option<String>,
    pub created_at: i64,
    pub active_since: Option<i64>,
    /// Seconds spent active, for the ledger's timeout/refund decision.
    pub active_for_secs: Option<i64>,
    pub completed_at: Option<i64>,
    pub outcome: Option<MatchOutcome>,
    pub reason: Option<CompletionReason>,
    pub settlement: SettlementState,
}
