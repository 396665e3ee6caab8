//! Connection registry: session handle → outbound message channel.
//!
//! The registry holds no game semantics. A lookup miss means the peer is
//! unreachable and the notification is skipped.

use duel_sdk::objects::ServerMessage;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Ephemeral handle of one live transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    /// A fresh random session id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Sender half of a session's outbound queue.
pub type OutboundSender = mpsc::Sender<ServerMessage>;
/// Receiver half of a session's outbound queue, drained by the transport.
pub type OutboundReceiver = mpsc::Receiver<ServerMessage>;

/// Create the outbound queue for a new session.
pub fn outbound_channel(buffer: usize) -> (OutboundSender, OutboundReceiver) {
    mpsc::channel(buffer.max(1))
}

/// Result of a non-blocking delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Session absent or its transport already gone.
    Unreachable,
    /// The session's queue is full; the message was dropped.
    Dropped,
}

/// Live sessions and their outbound queues.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<SessionId, OutboundSender>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id`. Re-registering replaces the previous channel.
    pub fn register(&mut self, id: SessionId, sender: OutboundSender) {
        if self.connections.insert(id, sender).is_some() {
            debug!(session = %id, "Session re-registered, previous channel replaced");
        }
    }

    pub fn lookup(&self, id: SessionId) -> Option<&OutboundSender> {
        self.connections.get(&id)
    }

    /// Remove `id`; returns whether it was present.
    pub fn remove(&mut self, id: SessionId) -> bool {
        self.connections.remove(&id).is_some()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Queue `message` for `id` without waiting.
    pub fn send(&self, id: SessionId, message: ServerMessage) -> Delivery {
        let Some(sender) = self.lookup(id) else {
            debug!(session = %id, "Peer unreachable, skipping notification");
            return Delivery::Unreachable;
        };
        match sender.try_send(message) {
            Ok(()) => Delivery::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(session = %id, "Outbound queue full, dropping notification");
                Delivery::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(session = %id, "Outbound queue closed, skipping notification");
                Delivery::Unreachable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_lookup_remove() {
        let mut registry = ConnectionRegistry::new();
        let id = SessionId::new();
        let (tx, _rx) = outbound_channel(4);

        assert!(registry.lookup(id).is_none());
        registry.register(id, tx);
        assert!(registry.contains(id));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_send_outcomes() {
        let mut registry = ConnectionRegistry::new();
        let id = SessionId::new();
        assert_eq!(registry.send(id, ServerMessage::Pong), Delivery::Unreachable);

        let (tx, mut rx) = outbound_channel(1);
        registry.register(id, tx);
        assert_eq!(registry.send(id, ServerMessage::Pong), Delivery::Sent);
        assert_eq!(registry.send(id, ServerMessage::Pong), Delivery::Dropped);
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::Pong);

        drop(rx);
        assert_eq!(registry.send(id, ServerMessage::Pong), Delivery::Unreachable);
    }
}
