//! Payloads exchanged with the ledger bridge.
//!
//! The coordinator sends [`SettlementRequest`] and [`PreStakeRefundRequest`]
//! to the bridge; the bridge reports on-chain progress back with
//! [`LedgerConfirmation`]. All three are body-signed with the shared ledger
//! secret (see [`crate::signature`]).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::game::ParticipantAddress;
use crate::signature::Signature;

/// Result the ledger should settle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementResult {
    Winner { participant: ParticipantAddress },
    /// Both stakes are returned; there is no winning address.
    Draw,
}

/// Ask the ledger to pay out a completed match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRequest {
    pub match_id: Uuid,
    pub stake_amount: Decimal,
    pub participant_a: ParticipantAddress,
    pub participant_b: ParticipantAddress,
    #[serde(flatten)]
    pub result: SettlementResult,
    /// Reference of the on-chain match, when the ledger reported one.
    pub external_ref: Option<String>,
}

impl Signature for SettlementRequest {}

/// Ask the ledger to return a declared stake that never made it into a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreStakeRefundRequest {
    pub participant: ParticipantAddress,
    pub amount: Decimal,
    pub match_id: Option<Uuid>,
    pub external_ref: Option<String>,
}

impl Signature for PreStakeRefundRequest {}

/// Body returned by the ledger bridge for an accepted request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAck {
    #[serde(default)]
    pub reference: Option<String>,
}

/// On-chain progress reported by the ledger bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerConfirmation {
    /// The escrow for `match_id` exists on chain.
    MatchCreated { match_id: Uuid, external_ref: String },
    /// `participant` has staked into `match_id`.
    Staked {
        match_id: Uuid,
        participant: ParticipantAddress,
        #[serde(default)]
        external_ref: Option<String>,
    },
}

impl LedgerConfirmation {
    pub fn match_id(&self) -> Uuid {
        match self {
            LedgerConfirmation::MatchCreated { match_id, .. } => *match_id,
            LedgerConfirmation::Staked { match_id, .. } => *match_id,
        }
    }
}

impl Signature for LedgerConfirmation {}

/// Response of `POST /api/v1/ledger/confirmations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationReceipt {
    pub match_id: Uuid,
    pub applied: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settlement_request_flattens_outcome() {
        let request = SettlementRequest {
            match_id: Uuid::nil(),
            stake_amount: Decimal::from(100),
            participant_a: "0xa".into(),
            participant_b: "0xb".into(),
            result: SettlementResult::Draw,
            external_ref: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["outcome"], "draw");
        assert!(json.get("participant").is_none());

        let winner = SettlementRequest {
            result: SettlementResult::Winner {
                participant: "0xa".into(),
            },
            ..request
        };
        let json = serde_json::to_value(&winner).unwrap();
        assert_eq!(json["outcome"], "winner");
        assert_eq!(json["participant"], "0xa");
    }

    #[test]
    fn test_confirmation_tagging() {
        let parsed: LedgerConfirmation = serde_json::from_str(
            r#"{"kind":"staked","match_id":"00000000-0000-0000-0000-000000000000","participant":"0xb"}"#,
        )
        .unwrap();
        assert_eq!(parsed.match_id(), Uuid::nil());
        assert!(matches!(
            parsed,
            LedgerConfirmation::Staked { external_ref: None, .. }
        ));
    }
}
