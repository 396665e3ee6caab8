//! Cloneable front door to a running coordinator service.
//!
//! Transport handlers never touch coordinator state; they send events and,
//! for queries, wait on a oneshot reply.

use crate::coordinator::CoordinatorError;
use crate::events::{CoordinatorEvent, CoordinatorEventSender, CoordinatorQuery};
use crate::registry::{OutboundReceiver, SessionId, outbound_channel};
use duel_sdk::objects::{
    ClientMessage, ConfirmationReceipt, ErrorCode, LedgerConfirmation, MatchView, StatsResponse,
};
use kanau::processor::Processor;
use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

/// The coordinator service has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("coordinator is not running")]
pub struct CoordinatorUnavailable;

/// Failure of a ledger confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfirmationError {
    #[error(transparent)]
    Unavailable(#[from] CoordinatorUnavailable),
    #[error(transparent)]
    Rejected(#[from] CoordinatorError),
}

impl ConfirmationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ConfirmationError::Unavailable(_) => ErrorCode::CoordinatorUnavailable,
            ConfirmationError::Rejected(e) => e.code(),
        }
    }
}

/// Aggregate counters.
#[derive(Debug, Clone, Copy)]
pub struct GetStats;

/// Snapshot of one match; `None` if absent or evicted.
#[derive(Debug, Clone, Copy)]
pub struct GetMatch {
    pub match_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    events: CoordinatorEventSender,
}

impl CoordinatorHandle {
    pub fn new(events: CoordinatorEventSender) -> Self {
        Self { events }
    }

    /// Register a new session and return its outbound queue.
    pub async fn connect(
        &self,
        buffer: usize,
    ) -> Result<(SessionId, OutboundReceiver), CoordinatorUnavailable> {
        let session = SessionId::new();
        let (sender, receiver) = outbound_channel(buffer);
        self.send(CoordinatorEvent::Connected { session, sender })
            .await?;
        Ok((session, receiver))
    }

    pub async fn client_message(
        &self,
        session: SessionId,
        message: ClientMessage,
    ) -> Result<(), CoordinatorUnavailable> {
        self.send(CoordinatorEvent::Client { session, message })
            .await
    }

    pub async fn disconnect(&self, session: SessionId) -> Result<(), CoordinatorUnavailable> {
        self.send(CoordinatorEvent::Disconnected { session }).await
    }

    async fn send(&self, event: CoordinatorEvent) -> Result<(), CoordinatorUnavailable> {
        self.events
            .send(event)
            .await
            .map_err(|_| CoordinatorUnavailable)
    }
}

impl Processor<GetStats> for CoordinatorHandle {
    type Output = StatsResponse;
    type Error = CoordinatorUnavailable;

    #[tracing::instrument(skip_all, err, name = "Query:GetStats")]
    async fn process(&self, _query: GetStats) -> Result<StatsResponse, CoordinatorUnavailable> {
        let (reply, rx) = oneshot::channel();
        self.send(CoordinatorEvent::Query(CoordinatorQuery::Stats { reply }))
            .await?;
        rx.await.map_err(|_| CoordinatorUnavailable)
    }
}

impl Processor<GetMatch> for CoordinatorHandle {
    type Output = Option<MatchView>;
    type Error = CoordinatorUnavailable;

    #[tracing::instrument(skip_all, err, name = "Query:GetMatch")]
    async fn process(&self, query: GetMatch) -> Result<Option<MatchView>, CoordinatorUnavailable> {
        let (reply, rx) = oneshot::channel();
        self.send(CoordinatorEvent::Query(CoordinatorQuery::Match {
            match_id: query.match_id,
            reply,
        }))
        .await?;
        rx.await.map_err(|_| CoordinatorUnavailable)
    }
}

impl Processor<LedgerConfirmation> for CoordinatorHandle {
    type Output = ConfirmationReceipt;
    type Error = ConfirmationError;

    #[tracing::instrument(skip_all, err, name = "Ledger:Confirmation")]
    async fn process(
        &self,
        confirmation: LedgerConfirmation,
    ) -> Result<ConfirmationReceipt, ConfirmationError> {
        let (reply, rx) = oneshot::channel();
        self.send(CoordinatorEvent::LedgerConfirmed {
            confirmation,
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| CoordinatorUnavailable)??)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::coordinator_event_channel;

    #[tokio::test]
    async fn test_stopped_coordinator_is_unavailable() {
        let (tx, rx) = coordinator_event_channel();
        drop(rx);
        let handle = CoordinatorHandle::new(tx);
        assert_eq!(handle.process(GetStats).await, Err(CoordinatorUnavailable));
        assert!(handle.connect(8).await.is_err());
        let err = handle
            .process(LedgerConfirmation::MatchCreated {
                match_id: Uuid::nil(),
                external_ref: "x".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CoordinatorUnavailable);
    }
}
