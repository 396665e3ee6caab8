//! Machine-readable rejection codes.
//!
//! Every rejection the coordinator emits, over the WebSocket or over HTTP,
//! carries one of these codes. The serialized names are stable.

use serde::{Deserialize, Serialize};

/// Broad category of a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or out-of-sequence client message.
    Protocol,
    /// The message was well formed but conflicts with the current match state.
    StateConflict,
    /// The server could not process the request.
    Internal,
}

/// Stable rejection code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MalformedMessage,
    UnsupportedFrame,
    InvalidParticipant,
    InvalidStake,
    DuplicateIntent,
    AlreadyInMatch,
    SessionMismatch,
    NotParticipant,
    NotYourTurn,
    WrongMarker,
    InvalidCell,
    CellOccupied,
    NotActive,
    UnknownMatch,
    MatchNotPending,
    CoordinatorUnavailable,
}

impl ErrorCode {
    /// The category this code belongs to.
    pub fn kind(self) -> ErrorKind {
        match self {
            ErrorCode::MalformedMessage
            | ErrorCode::UnsupportedFrame
            | ErrorCode::InvalidParticipant
            | ErrorCode::InvalidStake
            | ErrorCode::DuplicateIntent
            | ErrorCode::AlreadyInMatch
            | ErrorCode::SessionMismatch
            | ErrorCode::NotParticipant
            | ErrorCode::NotYourTurn
            | ErrorCode::WrongMarker
            | ErrorCode::InvalidCell
            | ErrorCode::CellOccupied
            | ErrorCode::NotActive => ErrorKind::Protocol,
            ErrorCode::UnknownMatch | ErrorCode::MatchNotPending => ErrorKind::StateConflict,
            ErrorCode::CoordinatorUnavailable => ErrorKind::Internal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MalformedMessage => "malformed_message",
            ErrorCode::UnsupportedFrame => "unsupported_frame",
            ErrorCode::InvalidParticipant => "invalid_participant",
            ErrorCode::InvalidStake => "invalid_stake",
            ErrorCode::DuplicateIntent => "duplicate_intent",
            ErrorCode::AlreadyInMatch => "already_in_match",
            ErrorCode::SessionMismatch => "session_mismatch",
            ErrorCode::NotParticipant => "not_participant",
            ErrorCode::NotYourTurn => "not_your_turn",
            ErrorCode::WrongMarker => "wrong_marker",
            ErrorCode::InvalidCell => "invalid_cell",
            ErrorCode::CellOccupied => "cell_occupied",
            ErrorCode::NotActive => "not_active",
            ErrorCode::UnknownMatch => "unknown_match",
            ErrorCode::MatchNotPending => "match_not_pending",
            ErrorCode::CoordinatorUnavailable => "coordinator_unavailable",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON body of an HTTP rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}
