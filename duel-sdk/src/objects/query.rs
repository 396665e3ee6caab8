//! Query API response types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// `GET /health` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Number of players waiting at one stake amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDepth {
    pub stake_amount: Decimal,
    pub waiting: usize,
}

/// `GET /api/v1/stats` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsResponse {
    /// Non-empty stake buckets, ascending by stake.
    pub queue_depths: Vec<QueueDepth>,
    pub waiting_total: usize,
    pub pre_commitments: usize,
    pub created_matches: usize,
    pub active_matches: usize,
    /// Completed matches still inside their retention window.
    pub completed_matches: usize,
    pub connections: usize,
}
