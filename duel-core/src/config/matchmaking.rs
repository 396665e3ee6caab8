//! Matchmaking and lifecycle timings.

use time::Duration;

/// Timings and buffer sizes of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchmakingConfig {
    /// Lifetime of a declared intent that has not become an active match.
    pub pre_commitment_ttl: Duration,
    /// Period of the expiry sweep.
    pub sweep_interval: Duration,
    /// How long a completed match stays queryable before eviction.
    pub completed_retention: Duration,
    /// Capacity of each session's outbound message queue.
    pub outbound_buffer: usize,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            pre_commitment_ttl: Duration::minutes(5),
            sweep_interval: Duration::seconds(30),
            completed_retention: Duration::seconds(60),
            outbound_buffer: 64,
        }
    }
}

impl MatchmakingConfig {
    /// Sweep period as a std duration for tokio timers. Never zero.
    pub fn sweep_period(&self) -> std::time::Duration {
        std::time::Duration::try_from(self.sweep_interval)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or(std::time::Duration::from_secs(1))
    }
}
