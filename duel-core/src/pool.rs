//! Waiting pool: per-stake FIFO queues of unpaired participants.

use crate::registry::SessionId;
use duel_sdk::objects::{ParticipantAddress, QueueDepth};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, VecDeque};
use time::OffsetDateTime;

/// One participant waiting for an opponent at a given stake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingEntry {
    pub participant: ParticipantAddress,
    pub stake: Decimal,
    pub session: SessionId,
    pub enqueued_at: OffsetDateTime,
}

/// Stake buckets keyed by the normalized amount, so `1.0` and `1.00`
/// share a queue.
#[derive(Debug, Default)]
pub struct WaitingPool {
    buckets: BTreeMap<Decimal, VecDeque<WaitingEntry>>,
    index: HashMap<ParticipantAddress, Decimal>,
}

impl WaitingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry` to its stake bucket, ordered by enqueue time. Entries
    /// with equal timestamps keep arrival order. A participant already
    /// waiting is replaced.
    pub fn enqueue(&mut self, entry: WaitingEntry) {
        self.remove_by_participant(&entry.participant);
        let key = entry.stake.normalize();
        let bucket = self.buckets.entry(key).or_default();
        let at = bucket.partition_point(|e| e.enqueued_at <= entry.enqueued_at);
        self.index.insert(entry.participant.clone(), key);
        bucket.insert(at, entry);
    }

    /// Pop the oldest entry at `stake`. Empty buckets are dropped.
    pub fn dequeue_oldest(&mut self, stake: Decimal) -> Option<WaitingEntry> {
        let key = stake.normalize();
        let bucket = self.buckets.get_mut(&key)?;
        let entry = bucket.pop_front();
        if bucket.is_empty() {
            self.buckets.remove(&key);
        }
        if let Some(entry) = &entry {
            self.index.remove(&entry.participant);
        }
        entry
    }

    /// Remove `participant` wherever it waits. Idempotent.
    pub fn remove_by_participant(&mut self, participant: &str) -> Option<WaitingEntry> {
        let key = self.index.remove(participant)?;
        let bucket = self.buckets.get_mut(&key)?;
        let position = bucket.iter().position(|e| e.participant == participant)?;
        let entry = bucket.remove(position);
        if bucket.is_empty() {
            self.buckets.remove(&key);
        }
        entry
    }

    pub fn contains(&self, participant: &str) -> bool {
        self.index.contains_key(participant)
    }

    pub fn get(&self, participant: &str) -> Option<&WaitingEntry> {
        let key = self.index.get(participant)?;
        self.buckets
            .get(key)?
            .iter()
            .find(|e| e.participant == participant)
    }

    /// Per-stake queue depth, ascending by amount.
    pub fn depths(&self) -> Vec<QueueDepth> {
        self.buckets
            .iter()
            .map(|(stake, bucket)| QueueDepth {
                stake_amount: *stake,
                waiting: bucket.len(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
