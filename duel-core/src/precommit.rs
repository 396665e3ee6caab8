//! Pre-commitment tracker: declared intents that have not yet become an
//! active match.

use duel_sdk::objects::ParticipantAddress;
use rust_decimal::Decimal;
use std::collections::HashMap;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreCommitment {
    pub participant: ParticipantAddress,
    pub stake: Decimal,
    pub declared_at: OffsetDateTime,
    pub confirmed: bool,
    /// Set once the participant has been paired into a CREATED match.
    pub match_id: Option<Uuid>,
    pub external_ref: Option<String>,
}

impl PreCommitment {
    /// Expired once strictly older than `ttl`; an intent exactly `ttl` old is
    /// still live.
    pub fn is_expired(&self, now: OffsetDateTime, ttl: Duration) -> bool {
        now - self.declared_at > ttl
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("participant {participant} already holds an open pre-commitment")]
pub struct DuplicateIntent {
    pub participant: ParticipantAddress,
}

#[derive(Debug, Default)]
pub struct PreCommitTracker {
    entries: HashMap<ParticipantAddress, PreCommitment>,
}

impl PreCommitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new declared intent. Fails if the participant already has one.
    pub fn declare(
        &mut self,
        participant: ParticipantAddress,
        stake: Decimal,
        now: OffsetDateTime,
    ) -> Result<(), DuplicateIntent> {
        if self.entries.contains_key(&participant) {
            return Err(DuplicateIntent { participant });
        }
        self.entries.insert(
            participant.clone(),
            PreCommitment {
                participant,
                stake,
                declared_at: now,
                confirmed: false,
                match_id: None,
                external_ref: None,
            },
        );
        Ok(())
    }

    pub fn get(&self, participant: &str) -> Option<&PreCommitment> {
        self.entries.get(participant)
    }

    pub fn contains(&self, participant: &str) -> bool {
        self.entries.contains_key(participant)
    }

    pub fn remove(&mut self, participant: &str) -> Option<PreCommitment> {
        self.entries.remove(participant)
    }

    pub fn mark_paired(&mut self, participant: &str, match_id: Uuid) {
        if let Some(entry) = self.entries.get_mut(participant) {
            entry.match_id = Some(match_id);
        }
    }

    pub fn mark_confirmed(&mut self, participant: &str) {
        if let Some(entry) = self.entries.get_mut(participant) {
            entry.confirmed = true;
        }
    }

    pub fn set_external_ref(&mut self, participant: &str, external_ref: &str) {
        if let Some(entry) = self.entries.get_mut(participant) {
            entry.external_ref = Some(external_ref.to_owned());
        }
    }

    /// Participants whose intent is older than `ttl` at `now`, oldest first.
    pub fn expired(&self, now: OffsetDateTime, ttl: Duration) -> Vec<ParticipantAddress> {
        let mut expired: Vec<&PreCommitment> = self
            .entries
            .values()
            .filter(|e| e.is_expired(now, ttl))
            .collect();
        expired.sort_by_key(|e| e.declared_at);
        expired.into_iter().map(|e| e.participant.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
