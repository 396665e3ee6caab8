//! Cancellable one-shot deadlines keyed by an identifier.
//!
//! The queue holds no clock of its own: callers ask for the next deadline,
//! sleep however they like, and then pop everything due at a given instant.
//! Tests drive it with constructed instants instead of waiting.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use time::OffsetDateTime;

/// Handle of one scheduled deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimerHandle {
    pub at: OffsetDateTime,
    seq: u64,
}

#[derive(Debug)]
pub struct DeadlineQueue<K> {
    queue: BTreeMap<TimerHandle, K>,
    handles: HashMap<K, TimerHandle>,
    next_seq: u64,
}

impl<K> Default for DeadlineQueue<K> {
    fn default() -> Self {
        Self {
            queue: BTreeMap::new(),
            handles: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<K: Clone + Eq + Hash> DeadlineQueue<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `key` to fire at `at`, replacing any earlier schedule for it.
    pub fn schedule(&mut self, key: K, at: OffsetDateTime) -> TimerHandle {
        self.cancel(&key);
        let handle = TimerHandle {
            at,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.queue.insert(handle, key.clone());
        self.handles.insert(key, handle);
        handle
    }

    /// Cancel the deadline for `key`; returns whether one was pending.
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.handles.remove(key) {
            Some(handle) => self.queue.remove(&handle).is_some(),
            None => false,
        }
    }

    pub fn deadline_of(&self, key: &K) -> Option<OffsetDateTime> {
        self.handles.get(key).map(|h| h.at)
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<OffsetDateTime> {
        self.queue.keys().next().map(|h| h.at)
    }

    /// Remove and return every key due at or before `now`, earliest first.
    pub fn pop_due(&mut self, now: OffsetDateTime) -> Vec<K> {
        let mut due = Vec::new();
        while let Some(entry) = self.queue.first_entry() {
            if entry.key().at > now {
                break;
            }
            let key = entry.remove();
            self.handles.remove(&key);
            due.push(key);
        }
        due
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
