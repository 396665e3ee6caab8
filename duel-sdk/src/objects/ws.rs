//! WebSocket message types for the play stream.
//!
//! The `GET /api/v1/play/ws` endpoint upgrades to a WebSocket connection.
//! Both directions carry internally-tagged JSON objects so each side can
//! dispatch on the `"type"` field:
//!
//! ```json
//! {"type":"join_intent","participant":"0xabc","stake_amount":"100"}
//! {"type":"waiting","participant":"0xabc","stake_amount":"100"}
//! {"type":"error","code":"duplicate_intent","kind":"protocol","message":"..."}
//! ```
//!
//! # Protocol
//!
//! 1. A player sends [`ClientMessage::JoinIntent`]. The server answers with
//!    [`ServerMessage::Waiting`] or, once paired, sends
//!    [`ServerMessage::Matched`] to both players.
//! 2. After staking on the ledger each player sends
//!    [`ClientMessage::StakeConfirmation`]. When both stakes are in, both
//!    players receive [`ServerMessage::Start`].
//! 3. Moves are relayed as [`ServerMessage::MoveApplied`] until a terminal
//!    board, a forfeit or a disconnect produces [`ServerMessage::GameOver`].
//! 4. The settlement result follows as [`ServerMessage::Settled`] or
//!    [`ServerMessage::SettlementPending`].
//!
//! A rejected message is answered with [`ServerMessage::Error`]; the server
//! never closes the socket because of a rejection.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{ErrorCode, ErrorKind};
use super::game::{CompletionReason, Marker, MatchOutcome, MatchView, ParticipantAddress};

/// Client-to-server WebSocket message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Declare intent to stake `stake_amount` and queue for an opponent.
    JoinIntent {
        participant: ParticipantAddress,
        stake_amount: Decimal,
    },
    /// Report that the on-ledger stake for `match_id` completed.
    StakeConfirmation {
        participant: ParticipantAddress,
        match_id: Uuid,
    },
    /// Place `marker` at (`row`, `col`).
    Move {
        match_id: Uuid,
        row: u8,
        col: u8,
        marker: Marker,
    },
    /// Give up an active match.
    Forfeit {
        match_id: Uuid,
        participant: ParticipantAddress,
    },
    /// Withdraw a pending join-intent.
    Cancel { participant: ParticipantAddress },
    Ping,
}

impl ClientMessage {
    /// Decode a text frame. Unknown `type` tags and missing fields are errors.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Server-to-client WebSocket message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The join-intent was queued.
    Waiting {
        participant: ParticipantAddress,
        stake_amount: Decimal,
    },
    /// Paired with an opponent; stake on the ledger next.
    Matched {
        details: MatchView,
        your_marker: Marker,
    },
    /// One participant's stake was confirmed.
    Staked {
        match_id: Uuid,
        participant: ParticipantAddress,
    },
    /// Both stakes are in; `first_mover` plays `X`.
    Start {
        match_id: Uuid,
        first_mover: ParticipantAddress,
        second_mover: ParticipantAddress,
        your_marker: Marker,
    },
    /// A move was accepted.
    MoveApplied {
        match_id: Uuid,
        row: u8,
        col: u8,
        marker: Marker,
        next_marker: Marker,
        board: Vec<Option<Marker>>,
    },
    /// The match is completed.
    GameOver {
        match_id: Uuid,
        outcome: MatchOutcome,
        reason: CompletionReason,
        final_board: Vec<Option<Marker>>,
    },
    /// The ledger acknowledged the settlement request.
    Settled {
        match_id: Uuid,
        reference: Option<String>,
    },
    /// The settlement request failed; the result is unresolved until the
    /// ledger settles it.
    SettlementPending { match_id: Uuid, message: String },
    /// The pending join-intent was withdrawn.
    Cancelled { participant: ParticipantAddress },
    /// The pre-commitment timed out; a refund was requested.
    Expired {
        participant: ParticipantAddress,
        stake_amount: Decimal,
        message: String,
    },
    /// The previous message was rejected.
    Error {
        code: ErrorCode,
        kind: ErrorKind,
        message: String,
    },
    Pong,
}

impl ServerMessage {
    /// Build an [`ServerMessage::Error`] with the kind derived from `code`.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code,
            kind: code.kind(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_join_intent_accepts_numeric_stake() {
        let msg =
            ClientMessage::decode(r#"{"type":"join_intent","participant":"0xa","stake_amount":100}"#)
                .unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinIntent {
                participant: "0xa".into(),
                stake_amount: Decimal::from(100),
            }
        );
    }

    #[test]
    fn test_decode_rejects_unknown_type_and_missing_fields() {
        assert!(ClientMessage::decode(r#"{"type":"teleport"}"#).is_err());
        assert!(ClientMessage::decode(r#"{"type":"move","row":0,"col":0}"#).is_err());
        assert!(ClientMessage::decode("not json").is_err());
    }

    #[test]
    fn test_error_message_shape() {
        let json = serde_json::to_value(ServerMessage::error(
            ErrorCode::CellOccupied,
            "cell (0, 0) is occupied",
        ))
        .unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "cell_occupied");
        assert_eq!(json["kind"], "protocol");
    }
}
