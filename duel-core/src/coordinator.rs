//! The coordinator: single owner of all matchmaking and match state.
//!
//! Every mutation goes through `&mut self` on [`Coordinator`], driven by one
//! event at a time from the coordinator service. Nothing here awaits:
//! notifications are queued on session channels and ledger requests are
//! queued for the settlement dispatcher, whose answers come back as new
//! events. Time is always passed in as `now`.

use crate::config::MatchmakingConfig;
use crate::events::{CoordinatorEvent, CoordinatorQuery, LedgerJob, LedgerJobSender};
use crate::matches::{FinalizeError, Match, MatchTable, MoveError, MoveOutcome, StakeError};
use crate::pool::{WaitingEntry, WaitingPool};
use crate::precommit::{DuplicateIntent, PreCommitTracker, PreCommitment};
use crate::processors::ledger::LedgerError;
use crate::registry::{ConnectionRegistry, Delivery, OutboundSender, SessionId};
use crate::rules::GameRules;
use crate::utils::DeadlineQueue;
use compact_str::CompactString;
use duel_sdk::objects::{
    ClientMessage, CompletionReason, ConfirmationReceipt, ErrorCode, LedgerAck,
    LedgerConfirmation, MatchOutcome, MatchStatus, MatchView, Marker, ParticipantAddress,
    PreStakeRefundRequest, ServerMessage, SettlementRequest, SettlementResult, SettlementState,
    StatsResponse,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Rejection of a client message or ledger confirmation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("participant address must not be empty")]
    InvalidParticipant,
    #[error("stake amount must be positive, got {0}")]
    InvalidStake(Decimal),
    #[error(transparent)]
    DuplicateIntent(#[from] DuplicateIntent),
    #[error("participant is already playing match {0}")]
    AlreadyInMatch(Uuid),
    #[error("this session acts for a different participant")]
    SessionMismatch,
    #[error("not a participant of match {0}")]
    NotParticipant(Uuid),
    #[error("not your turn, {0} moves after your opponent")]
    NotYourTurn(Marker),
    #[error("you play {expected}")]
    WrongMarker { expected: Marker },
    #[error("cell ({row}, {col}) is outside the board")]
    InvalidCell { row: u8, col: u8 },
    #[error("cell ({row}, {col}) is already occupied")]
    CellOccupied { row: u8, col: u8 },
    #[error("match {0} is not active")]
    NotActive(Uuid),
    #[error("match {0} not found")]
    UnknownMatch(Uuid),
    #[error("match {0} is already completed")]
    MatchNotPending(Uuid),
}

impl CoordinatorError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CoordinatorError::InvalidParticipant => ErrorCode::InvalidParticipant,
            CoordinatorError::InvalidStake(_) => ErrorCode::InvalidStake,
            CoordinatorError::DuplicateIntent(_) => ErrorCode::DuplicateIntent,
            CoordinatorError::AlreadyInMatch(_) => ErrorCode::AlreadyInMatch,
            CoordinatorError::SessionMismatch => ErrorCode::SessionMismatch,
            CoordinatorError::NotParticipant(_) => ErrorCode::NotParticipant,
            CoordinatorError::NotYourTurn(_) => ErrorCode::NotYourTurn,
            CoordinatorError::WrongMarker { .. } => ErrorCode::WrongMarker,
            CoordinatorError::InvalidCell { .. } => ErrorCode::InvalidCell,
            CoordinatorError::CellOccupied { .. } => ErrorCode::CellOccupied,
            CoordinatorError::NotActive(_) => ErrorCode::NotActive,
            CoordinatorError::UnknownMatch(_) => ErrorCode::UnknownMatch,
            CoordinatorError::MatchNotPending(_) => ErrorCode::MatchNotPending,
        }
    }
}

/// Session ↔ participant binding. A session acts for one participant; a
/// participant is reachable through at most one session.
#[derive(Debug, Default)]
struct SessionBindings {
    by_session: HashMap<SessionId, ParticipantAddress>,
    by_participant: HashMap<ParticipantAddress, SessionId>,
}

impl SessionBindings {
    fn participant_of(&self, session: SessionId) -> Option<&ParticipantAddress> {
        self.by_session.get(&session)
    }

    fn session_of(&self, participant: &str) -> Option<SessionId> {
        self.by_participant.get(participant).copied()
    }

    fn bind(&mut self, session: SessionId, participant: ParticipantAddress) {
        if let Some(previous) = self.by_participant.insert(participant.clone(), session) {
            self.by_session.remove(&previous);
        }
        self.by_session.insert(session, participant);
    }

    /// Drop `session`. Returns the participant only if the session was still
    /// that participant's current one.
    fn unbind_session(&mut self, session: SessionId) -> Option<ParticipantAddress> {
        let participant = self.by_session.remove(&session)?;
        if self.by_participant.get(&participant) == Some(&session) {
            self.by_participant.remove(&participant);
            Some(participant)
        } else {
            None
        }
    }
}

pub struct Coordinator {
    registry: ConnectionRegistry,
    pool: WaitingPool,
    precommits: PreCommitTracker,
    table: MatchTable,
    rules: Arc<dyn GameRules>,
    evictions: DeadlineQueue<Uuid>,
    bindings: SessionBindings,
    config: MatchmakingConfig,
    ledger_jobs: LedgerJobSender,
}

fn validate_participant(participant: &str) -> Result<ParticipantAddress, CoordinatorError> {
    let trimmed = participant.trim();
    if trimmed.is_empty() {
        return Err(CoordinatorError::InvalidParticipant);
    }
    Ok(CompactString::from(trimmed))
}

impl Coordinator {
    pub fn new(
        rules: Arc<dyn GameRules>,
        config: MatchmakingConfig,
        ledger_jobs: LedgerJobSender,
    ) -> Self {
        info!(rules = rules.name(), "Coordinator created");
        Self {
            registry: ConnectionRegistry::new(),
            pool: WaitingPool::new(),
            precommits: PreCommitTracker::new(),
            table: MatchTable::new(),
            rules,
            evictions: DeadlineQueue::new(),
            bindings: SessionBindings::default(),
            config,
            ledger_jobs,
        }
    }

    pub fn config(&self) -> &MatchmakingConfig {
        &self.config
    }

    /// Apply reloaded timings. Existing deadlines keep their schedule; new
    /// ones use the new values.
    pub fn update_config(&mut self, config: MatchmakingConfig) {
        self.config = config;
    }

    pub fn get_match(&self, match_id: Uuid) -> Option<&Match> {
        self.table.get(match_id)
    }

    /// Earliest pending eviction of a completed match.
    pub fn next_eviction(&self) -> Option<OffsetDateTime> {
        self.evictions.next_deadline()
    }

    pub fn handle_event(&mut self, event: CoordinatorEvent, now: OffsetDateTime) {
        match event {
            CoordinatorEvent::Connected { session, sender } => self.connect(session, sender),
            CoordinatorEvent::Disconnected { session } => self.disconnect(session, now),
            CoordinatorEvent::Client { session, message } => {
                self.handle_client(session, message, now)
            }
            CoordinatorEvent::LedgerConfirmed {
                confirmation,
                reply,
            } => {
                let result = self.ledger_confirmation(confirmation, now);
                if reply.send(result).is_err() {
                    debug!("Ledger confirmation caller went away before the reply");
                }
            }
            CoordinatorEvent::LedgerFinished { job, result } => self.ledger_finished(job, result),
            CoordinatorEvent::Query(CoordinatorQuery::Stats { reply }) => {
                if reply.send(self.stats()).is_err() {
                    debug!("Stats caller went away before the reply");
                }
            }
            CoordinatorEvent::Query(CoordinatorQuery::Match { match_id, reply }) => {
                if reply.send(self.match_view(match_id, now)).is_err() {
                    debug!(%match_id, "Match query caller went away before the reply");
                }
            }
        }
    }

    // -- Connections --------------------------------------------------------

    pub fn connect(&mut self, session: SessionId, sender: OutboundSender) {
        self.registry.register(session, sender);
        debug!(session = %session, "Session connected");
    }

    /// Handle a dropped connection. Safe to call more than once.
    ///
    /// An ACTIVE match is lost by the disconnected participant; a queued or
    /// unpaired participant is removed. A CREATED match is left alone so the
    /// participant may reconnect and finish staking before the deadline.
    pub fn disconnect(&mut self, session: SessionId, now: OffsetDateTime) {
        self.registry.remove(session);
        let Some(participant) = self.bindings.unbind_session(session) else {
            debug!(session = %session, "Session closed without an active binding");
            return;
        };

        if let Some(m) = self.table.open_match_of(&participant) {
            if m.status() == MatchStatus::Active {
                let match_id = m.id();
                if let Some((opponent, marker)) = m
                    .opponent_of(&participant)
                    .and_then(|o| m.marker_of(o).map(|mk| (o.clone(), mk)))
                {
                    info!(%match_id, participant = %participant, "Participant disconnected during play");
                    self.complete(
                        match_id,
                        MatchOutcome::Winner {
                            participant: opponent,
                            marker,
                        },
                        CompletionReason::Disconnect,
                        now,
                    );
                }
            }
            return;
        }

        let queued = self.pool.remove_by_participant(&participant).is_some();
        let declared = self.precommits.remove(&participant).is_some();
        if queued || declared {
            info!(participant = %participant, "Removed unpaired participant after disconnect");
        }
    }

    // -- Client messages ----------------------------------------------------

    /// Dispatch one client message. Rejections are answered on the same
    /// session with an error frame.
    pub fn handle_client(&mut self, session: SessionId, message: ClientMessage, now: OffsetDateTime) {
        let result = match message {
            ClientMessage::JoinIntent {
                participant,
                stake_amount,
            } => self.join_intent(session, &participant, stake_amount, now),
            ClientMessage::StakeConfirmation {
                participant,
                match_id,
            } => self.confirm_stake(session, &participant, match_id, now),
            ClientMessage::Move {
                match_id,
                row,
                col,
                marker,
            } => self.play_move(session, match_id, row, col, marker, now),
            ClientMessage::Forfeit {
                match_id,
                participant,
            } => self.forfeit(session, match_id, &participant, now),
            ClientMessage::Cancel { participant } => self.cancel(session, &participant, now),
            ClientMessage::Ping => {
                self.registry.send(session, ServerMessage::Pong);
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!(session = %session, code = %e.code(), error = %e, "Rejected client message");
            self.registry
                .send(session, ServerMessage::error(e.code(), e.to_string()));
        }
    }

    /// Declare intent to stake and either pair with the oldest participant
    /// waiting at exactly the same stake or start waiting.
    pub fn join_intent(
        &mut self,
        session: SessionId,
        participant: &str,
        stake: Decimal,
        now: OffsetDateTime,
    ) -> Result<(), CoordinatorError> {
        let participant = validate_participant(participant)?;
        if stake <= Decimal::ZERO {
            return Err(CoordinatorError::InvalidStake(stake));
        }
        self.bind(session, &participant)?;

        if self
            .precommits
            .get(&participant)
            .is_some_and(|pc| pc.is_expired(now, self.config.pre_commitment_ttl))
        {
            self.expire(&participant, now);
        }
        if !self.precommits.contains(&participant) {
            if let Some(m) = self.table.open_match_of(&participant) {
                return Err(CoordinatorError::AlreadyInMatch(m.id()));
            }
        }
        self.precommits.declare(participant.clone(), stake, now)?;

        match self.take_opponent(stake, now) {
            Some(waiting) => self.pair(waiting, participant, stake, now),
            None => {
                self.pool.enqueue(WaitingEntry {
                    participant: participant.clone(),
                    stake,
                    session,
                    enqueued_at: now,
                });
                info!(participant = %participant, stake = %stake, "Participant waiting for an opponent");
                self.registry.send(
                    session,
                    ServerMessage::Waiting {
                        participant,
                        stake_amount: stake,
                    },
                );
            }
        }
        Ok(())
    }

    /// Report an on-ledger stake from the player's side.
    pub fn confirm_stake(
        &mut self,
        session: SessionId,
        participant: &str,
        match_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<(), CoordinatorError> {
        let participant = validate_participant(participant)?;
        self.bind(session, &participant)?;
        self.apply_stake(match_id, &participant, now).map(|_| ())
    }

    /// Accept a confirmation from the ledger bridge.
    pub fn ledger_confirmation(
        &mut self,
        confirmation: LedgerConfirmation,
        now: OffsetDateTime,
    ) -> Result<ConfirmationReceipt, CoordinatorError> {
        let match_id = confirmation.match_id();
        let applied = match confirmation {
            LedgerConfirmation::MatchCreated { external_ref, .. } => {
                let (a, b) = self
                    .participants(match_id)
                    .ok_or(CoordinatorError::UnknownMatch(match_id))?;
                let changed = self.table.get(match_id).and_then(Match::external_ref)
                    != Some(external_ref.as_str());
                self.table.set_external_ref(match_id, &external_ref);
                for participant in [&a, &b] {
                    if self.precommits.get(participant).and_then(|pc| pc.match_id) == Some(match_id)
                    {
                        self.precommits.set_external_ref(participant, &external_ref);
                    }
                }
                info!(%match_id, external_ref = %external_ref, "Ledger match reference recorded");
                changed
            }
            LedgerConfirmation::Staked {
                participant,
                external_ref,
                ..
            } => {
                let participant = validate_participant(&participant)?;
                let applied = self.apply_stake(match_id, &participant, now)?;
                if let Some(external_ref) = external_ref {
                    self.table.set_external_ref(match_id, &external_ref);
                }
                applied
            }
        };
        Ok(ConfirmationReceipt { match_id, applied })
    }

    /// Relay a move from the participant bound to `session`.
    pub fn play_move(
        &mut self,
        session: SessionId,
        match_id: Uuid,
        row: u8,
        col: u8,
        marker: Marker,
        now: OffsetDateTime,
    ) -> Result<(), CoordinatorError> {
        let participant = self
            .bindings
            .participant_of(session)
            .cloned()
            .ok_or(CoordinatorError::NotParticipant(match_id))?;
        let m = self
            .table
            .get(match_id)
            .ok_or(CoordinatorError::UnknownMatch(match_id))?;
        let own = m
            .marker_of(&participant)
            .ok_or(CoordinatorError::NotParticipant(match_id))?;
        if m.status() != MatchStatus::Active {
            return Err(CoordinatorError::NotActive(match_id));
        }
        if marker != own {
            return Err(CoordinatorError::WrongMarker { expected: own });
        }
        if m.next_marker() != Some(own) {
            return Err(CoordinatorError::NotYourTurn(own));
        }
        let index = m
            .board()
            .index_of(row, col)
            .ok_or(CoordinatorError::InvalidCell { row, col })?;

        let outcome = self
            .table
            .apply_move(match_id, index, marker, self.rules.as_ref())
            .map_err(|e| match e {
                MoveError::UnknownMatch => CoordinatorError::UnknownMatch(match_id),
                MoveError::NotActive => CoordinatorError::NotActive(match_id),
                MoveError::CellOccupied => CoordinatorError::CellOccupied { row, col },
                MoveError::CellOutOfRange => CoordinatorError::InvalidCell { row, col },
            })?;
        debug!(%match_id, participant = %participant, row, col, %marker, "Move accepted");

        match outcome {
            MoveOutcome::Continue { next_marker } => {
                let board = self
                    .table
                    .get(match_id)
                    .map(|m| m.board().cells().to_vec())
                    .unwrap_or_default();
                self.notify_both(
                    match_id,
                    ServerMessage::MoveApplied {
                        match_id,
                        row,
                        col,
                        marker,
                        next_marker,
                        board,
                    },
                );
            }
            MoveOutcome::Win { marker } => self.complete(
                match_id,
                MatchOutcome::Winner {
                    participant,
                    marker,
                },
                CompletionReason::Line,
                now,
            ),
            MoveOutcome::Draw => {
                self.complete(match_id, MatchOutcome::Draw, CompletionReason::Draw, now)
            }
        }
        Ok(())
    }

    /// Give up an ACTIVE match; the opponent wins.
    pub fn forfeit(
        &mut self,
        session: SessionId,
        match_id: Uuid,
        participant: &str,
        now: OffsetDateTime,
    ) -> Result<(), CoordinatorError> {
        let participant = validate_participant(participant)?;
        self.bind(session, &participant)?;
        let m = self
            .table
            .get(match_id)
            .ok_or(CoordinatorError::UnknownMatch(match_id))?;
        let opponent = m
            .opponent_of(&participant)
            .cloned()
            .ok_or(CoordinatorError::NotParticipant(match_id))?;
        if m.status() != MatchStatus::Active {
            return Err(CoordinatorError::NotActive(match_id));
        }
        let marker = m
            .marker_of(&opponent)
            .ok_or(CoordinatorError::NotParticipant(match_id))?;

        info!(%match_id, participant = %participant, "Participant forfeited");
        self.complete(
            match_id,
            MatchOutcome::Winner {
                participant: opponent,
                marker,
            },
            CompletionReason::Forfeit,
            now,
        );
        Ok(())
    }

    /// Withdraw a pending intent. Cancelling after pairing aborts the
    /// CREATED match for both participants. No-op when nothing is pending.
    pub fn cancel(
        &mut self,
        session: SessionId,
        participant: &str,
        now: OffsetDateTime,
    ) -> Result<(), CoordinatorError> {
        let participant = validate_participant(participant)?;
        self.bind(session, &participant)?;

        let queued = self.pool.remove_by_participant(&participant).is_some();
        let cancelled = match self.precommits.get(&participant).and_then(|pc| pc.match_id) {
            Some(match_id) => {
                self.abort(match_id, CompletionReason::Cancelled, now);
                true
            }
            None => self.precommits.remove(&participant).is_some() || queued,
        };
        if cancelled {
            info!(participant = %participant, "Join intent cancelled");
            self.notify(&participant, ServerMessage::Cancelled {
                participant: participant.clone(),
            });
        }
        Ok(())
    }

    // -- Timers -------------------------------------------------------------

    /// Remove every pre-commitment older than one TTL, by declared time.
    /// Returns how many expired.
    pub fn sweep(&mut self, now: OffsetDateTime) -> usize {
        let expired = self
            .precommits
            .expired(now, self.config.pre_commitment_ttl);
        for participant in &expired {
            self.expire(participant, now);
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Expiry sweep removed pre-commitments");
        }
        expired.len()
    }

    /// Evict completed matches whose retention window has passed.
    pub fn evict_due(&mut self, now: OffsetDateTime) -> Vec<Uuid> {
        let due = self.evictions.pop_due(now);
        for match_id in &due {
            if self.table.evict(*match_id).is_some() {
                info!(%match_id, "Evicted completed match");
            }
        }
        due
    }

    /// Record the answer of the ledger bridge to an earlier request.
    pub fn ledger_finished(&mut self, job: LedgerJob, result: Result<LedgerAck, LedgerError>) {
        match (job, result) {
            (LedgerJob::Settlement(request), Ok(ack)) => {
                let match_id = request.match_id;
                self.table
                    .set_settlement(match_id, SettlementState::Acknowledged);
                info!(%match_id, reference = ?ack.reference, "Settlement acknowledged");
                let message = ServerMessage::Settled {
                    match_id,
                    reference: ack.reference,
                };
                self.notify(&request.participant_a, message.clone());
                self.notify(&request.participant_b, message);
            }
            (LedgerJob::Settlement(request), Err(e)) => {
                error!(match_id = %request.match_id, error = %e, "Settlement request failed");
                self.settlement_failed(&request, format!("settlement request failed: {e}"));
            }
            (LedgerJob::Refund(request), Ok(ack)) => {
                info!(
                    participant = %request.participant,
                    amount = %request.amount,
                    reference = ?ack.reference,
                    "Pre-stake refund acknowledged"
                );
            }
            (LedgerJob::Refund(request), Err(e)) => {
                error!(
                    participant = %request.participant,
                    amount = %request.amount,
                    error = %e,
                    "Pre-stake refund request failed"
                );
            }
        }
    }

    // -- Queries ------------------------------------------------------------

    pub fn stats(&self) -> StatsResponse {
        let counts = self.table.counts();
        StatsResponse {
            queue_depths: self.pool.depths(),
            waiting_total: self.pool.len(),
            pre_commitments: self.precommits.len(),
            created_matches: counts.created,
            active_matches: counts.active,
            completed_matches: counts.completed,
            connections: self.registry.len(),
        }
    }

    pub fn match_view(&self, match_id: Uuid, now: OffsetDateTime) -> Option<MatchView> {
        self.table.get(match_id).map(|m| m.view(now))
    }

    // -- Internals ----------------------------------------------------------

    fn bind(&mut self, session: SessionId, participant: &ParticipantAddress) -> Result<(), CoordinatorError> {
        if let Some(bound) = self.bindings.participant_of(session) {
            return if bound == participant {
                Ok(())
            } else {
                Err(CoordinatorError::SessionMismatch)
            };
        }
        if let Some(other) = self.bindings.session_of(participant) {
            if self.registry.contains(other) {
                return Err(CoordinatorError::SessionMismatch);
            }
            debug!(participant = %participant, session = %session, "Participant reconnected");
        }
        self.bindings.bind(session, participant.clone());
        Ok(())
    }

    /// Whether `participant` is bound to a session that is still open.
    fn is_connected(&self, participant: &str) -> bool {
        self.bindings
            .session_of(participant)
            .is_some_and(|session| self.registry.contains(session))
    }

    fn notify(&self, participant: &str, message: ServerMessage) -> Delivery {
        match self.bindings.session_of(participant) {
            Some(session) => self.registry.send(session, message),
            None => {
                debug!(participant, "No session bound, skipping notification");
                Delivery::Unreachable
            }
        }
    }

    fn notify_both(&self, match_id: Uuid, message: ServerMessage) {
        if let Some((a, b)) = self.participants(match_id) {
            self.notify(&a, message.clone());
            self.notify(&b, message);
        }
    }

    fn participants(&self, match_id: Uuid) -> Option<(ParticipantAddress, ParticipantAddress)> {
        self.table
            .get(match_id)
            .map(|m| (m.participant_a().clone(), m.participant_b().clone()))
    }

    /// Pop the oldest waiting entry at `stake` whose pre-commitment is still
    /// live. Stale entries found on the way are expired on the spot.
    fn take_opponent(&mut self, stake: Decimal, now: OffsetDateTime) -> Option<WaitingEntry> {
        while let Some(entry) = self.pool.dequeue_oldest(stake) {
            match self.precommits.get(&entry.participant) {
                Some(pc) if !pc.is_expired(now, self.config.pre_commitment_ttl) => {
                    return Some(entry);
                }
                Some(_) => {
                    debug!(participant = %entry.participant, "Skipping expired waiting entry");
                    self.expire(&entry.participant, now);
                }
                None => {
                    debug!(participant = %entry.participant, "Dropping waiting entry without pre-commitment");
                }
            }
        }
        None
    }

    fn pair(
        &mut self,
        waiting: WaitingEntry,
        participant: ParticipantAddress,
        stake: Decimal,
        now: OffsetDateTime,
    ) {
        let board = self.rules.new_board();
        let details = self
            .table
            .create(waiting.participant.clone(), participant.clone(), stake, board, now)
            .view(now);
        let match_id = details.match_id;
        self.precommits.mark_paired(&waiting.participant, match_id);
        self.precommits.mark_paired(&participant, match_id);

        info!(
            %match_id,
            participant_a = %waiting.participant,
            participant_b = %participant,
            stake = %stake,
            "Participants paired"
        );
        self.notify(&waiting.participant, ServerMessage::Matched {
            details: details.clone(),
            your_marker: Marker::X,
        });
        self.notify(&participant, ServerMessage::Matched {
            details,
            your_marker: Marker::O,
        });
    }

    /// Mark a stake; returns whether anything changed.
    fn apply_stake(
        &mut self,
        match_id: Uuid,
        participant: &ParticipantAddress,
        now: OffsetDateTime,
    ) -> Result<bool, CoordinatorError> {
        let mark = self
            .table
            .mark_staked(match_id, participant, now)
            .map_err(|e| match e {
                StakeError::UnknownMatch => CoordinatorError::UnknownMatch(match_id),
                StakeError::NotParticipant => CoordinatorError::NotParticipant(match_id),
                StakeError::Completed => CoordinatorError::MatchNotPending(match_id),
            })?;
        let Some((a, b)) = self.participants(match_id) else {
            return Ok(mark.newly_staked);
        };

        if mark.newly_staked {
            self.precommits.mark_confirmed(participant);
            info!(%match_id, participant = %participant, "Stake confirmed");
            self.notify_both(match_id, ServerMessage::Staked {
                match_id,
                participant: participant.clone(),
            });
        }
        if mark.activated {
            self.precommits.remove(&a);
            self.precommits.remove(&b);
            info!(%match_id, first_mover = %a, "Match active");

            // A participant who left while the match was CREATED will never
            // produce a disconnect event, so settle their absence here.
            let absent = match (self.is_connected(&a), self.is_connected(&b)) {
                (true, true) => None,
                (false, true) => Some(MatchOutcome::Winner {
                    participant: b.clone(),
                    marker: Marker::O,
                }),
                (true, false) => Some(MatchOutcome::Winner {
                    participant: a.clone(),
                    marker: Marker::X,
                }),
                (false, false) => Some(MatchOutcome::Draw),
            };
            if let Some(outcome) = absent {
                info!(%match_id, ?outcome, "Participant gone at activation");
                self.complete(match_id, outcome, CompletionReason::Disconnect, now);
                return Ok(mark.newly_staked);
            }
            for (to, your_marker) in [(&a, Marker::X), (&b, Marker::O)] {
                self.notify(to, ServerMessage::Start {
                    match_id,
                    first_mover: a.clone(),
                    second_mover: b.clone(),
                    your_marker,
                });
            }
        }
        Ok(mark.newly_staked)
    }

    /// Finalize, notify both participants, request settlement for a decided
    /// game and schedule eviction. A match already completed is left as is.
    fn complete(
        &mut self,
        match_id: Uuid,
        outcome: MatchOutcome,
        reason: CompletionReason,
        now: OffsetDateTime,
    ) {
        let (a, b, stake, external_ref, final_board) =
            match self.table.finalize(match_id, outcome.clone(), reason, now) {
                Ok(m) => (
                    m.participant_a().clone(),
                    m.participant_b().clone(),
                    m.stake(),
                    m.external_ref().map(str::to_owned),
                    m.board().cells().to_vec(),
                ),
                Err(FinalizeError::AlreadyCompleted) => {
                    debug!(%match_id, "Match already completed, ignoring");
                    return;
                }
                Err(FinalizeError::UnknownMatch) => {
                    warn!(%match_id, "Cannot complete unknown match");
                    return;
                }
            };
        info!(%match_id, ?reason, ?outcome, "Match completed");

        let game_over = ServerMessage::GameOver {
            match_id,
            outcome: outcome.clone(),
            reason,
            final_board,
        };
        self.notify(&a, game_over.clone());
        self.notify(&b, game_over);

        let result = match outcome {
            MatchOutcome::Winner { participant, .. } => Some(SettlementResult::Winner { participant }),
            MatchOutcome::Draw => Some(SettlementResult::Draw),
            MatchOutcome::Aborted => None,
        };
        if let Some(result) = result {
            self.request_settlement(SettlementRequest {
                match_id,
                stake_amount: stake,
                participant_a: a,
                participant_b: b,
                result,
                external_ref,
            });
        }

        self.evictions
            .schedule(match_id, now + self.config.completed_retention);
    }

    fn request_settlement(&mut self, request: SettlementRequest) {
        let match_id = request.match_id;
        if let Err(e) = self.ledger_jobs.try_send(LedgerJob::Settlement(request)) {
            error!(%match_id, error = %e, "Could not queue settlement request");
            if let LedgerJob::Settlement(request) = e.into_inner() {
                self.settlement_failed(&request, "settlement request could not be submitted".into());
            }
            return;
        }
        self.table.set_settlement(match_id, SettlementState::Pending);
        info!(%match_id, "Settlement requested");
    }

    fn settlement_failed(&mut self, request: &SettlementRequest, reason: String) {
        self.table
            .set_settlement(request.match_id, SettlementState::Failed);
        let message = ServerMessage::SettlementPending {
            match_id: request.match_id,
            message: format!("{reason}; the result stays unresolved until the ledger settles it"),
        };
        self.notify(&request.participant_a, message.clone());
        self.notify(&request.participant_b, message);
    }

    fn request_refund(&self, precommit: PreCommitment) {
        let request = PreStakeRefundRequest {
            participant: precommit.participant,
            amount: precommit.stake,
            match_id: precommit.match_id,
            external_ref: precommit.external_ref,
        };
        let participant = request.participant.clone();
        let amount = request.amount;
        match self.ledger_jobs.try_send(LedgerJob::Refund(request)) {
            Ok(()) => info!(participant = %participant, amount = %amount, "Pre-stake refund requested"),
            Err(e) => error!(
                participant = %participant,
                amount = %amount,
                error = %e,
                "Could not queue pre-stake refund"
            ),
        }
    }

    /// Drop an expired pre-commitment: refund, notify, and abort the CREATED
    /// match it was paired into.
    fn expire(&mut self, participant: &str, now: OffsetDateTime) {
        let Some(precommit) = self.precommits.remove(participant) else {
            return;
        };
        self.pool.remove_by_participant(participant);
        info!(participant, stake = %precommit.stake, "Pre-commitment expired");

        let paired = precommit.match_id;
        self.notify(participant, ServerMessage::Expired {
            participant: precommit.participant.clone(),
            stake_amount: precommit.stake,
            message: "pre-commitment expired before the match started; a refund was requested"
                .to_owned(),
        });
        self.request_refund(precommit);

        if let Some(match_id) = paired {
            if self
                .table
                .get(match_id)
                .is_some_and(|m| m.status() == MatchStatus::Created)
            {
                self.abort(match_id, CompletionReason::Expired, now);
            }
        }
    }

    /// Abort a CREATED match: release both pre-commitments, refunding those
    /// already confirmed or past their deadline, and complete it without a
    /// settlement.
    fn abort(&mut self, match_id: Uuid, reason: CompletionReason, now: OffsetDateTime) {
        let Some((a, b)) = self.participants(match_id) else {
            return;
        };
        for participant in [&a, &b] {
            if self.precommits.get(participant).and_then(|pc| pc.match_id) != Some(match_id) {
                continue;
            }
            if let Some(precommit) = self.precommits.remove(participant) {
                if precommit.confirmed
                    || precommit.is_expired(now, self.config.pre_commitment_ttl)
                {
                    self.request_refund(precommit);
                }
            }
        }
        self.complete(match_id, MatchOutcome::Aborted, reason, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ledger_job_channel, LedgerJobReceiver};
    use crate::registry::{outbound_channel, OutboundReceiver};
    use crate::rules::{Board, TicTacToe};
    use time::Duration;

    struct Harness {
        coordinator: Coordinator,
        jobs: LedgerJobReceiver,
        now: OffsetDateTime,
    }

    struct Player {
        session: SessionId,
        rx: OutboundReceiver,
        name: &'static str,
    }

    impl Player {
        fn drain(&mut self) -> Vec<ServerMessage> {
            let mut messages = Vec::new();
            while let Ok(message) = self.rx.try_recv() {
                messages.push(message);
            }
            messages
        }

        fn last(&mut self) -> ServerMessage {
            self.drain().pop().unwrap()
        }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(TicTacToe))
    }

    fn harness_with(rules: Arc<dyn GameRules>) -> Harness {
        let (tx, jobs) = ledger_job_channel();
        Harness {
            coordinator: Coordinator::new(rules, MatchmakingConfig::default(), tx),
            jobs,
            now: OffsetDateTime::UNIX_EPOCH,
        }
    }

    impl Harness {
        fn player(&mut self, name: &'static str) -> Player {
            let session = SessionId::new();
            let (tx, rx) = outbound_channel(64);
            self.coordinator.connect(session, tx);
            Player { session, rx, name }
        }

        fn advance(&mut self, secs: i64) {
            self.now += Duration::seconds(secs);
        }

        fn send(&mut self, player: &Player, message: ClientMessage) {
            self.coordinator.handle_client(player.session, message, self.now);
        }

        fn join(&mut self, player: &Player, stake: i64) {
            self.send(player, ClientMessage::JoinIntent {
                participant: player.name.into(),
                stake_amount: Decimal::from(stake),
            });
        }

        fn confirm(&mut self, player: &Player, match_id: Uuid) {
            self.send(player, ClientMessage::StakeConfirmation {
                participant: player.name.into(),
                match_id,
            });
        }

        fn play(&mut self, player: &Player, match_id: Uuid, row: u8, col: u8, marker: Marker) {
            self.send(player, ClientMessage::Move {
                match_id,
                row,
                col,
                marker,
            });
        }

        fn jobs(&mut self) -> Vec<LedgerJob> {
            let mut jobs = Vec::new();
            while let Ok(job) = self.jobs.try_recv() {
                jobs.push(job);
            }
            jobs
        }

        /// Pair `a` and `b` at stake 100, returning the match id.
        fn paired(&mut self, a: &mut Player, b: &mut Player) -> Uuid {
            self.join(a, 100);
            self.join(b, 100);
            let ServerMessage::Matched { details, .. } = b.last() else {
                panic!("expected matched");
            };
            a.drain();
            details.match_id
        }

        fn active(&mut self, a: &mut Player, b: &mut Player) -> Uuid {
            let match_id = self.paired(a, b);
            self.confirm(a, match_id);
            self.confirm(b, match_id);
            a.drain();
            b.drain();
            match_id
        }
    }

    fn error_code(message: &ServerMessage) -> ErrorCode {
        match message {
            ServerMessage::Error { code, .. } => *code,
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_full_match_won_on_top_row() {
        let mut h = harness();
        let mut a = h.player("0xA");
        let mut b = h.player("0xB");

        h.join(&a, 100);
        assert!(matches!(a.last(), ServerMessage::Waiting { .. }));
        h.join(&b, 100);

        let ServerMessage::Matched { details: seen_a, your_marker: Marker::X } = a.last() else {
            panic!("A should be matched as X");
        };
        let ServerMessage::Matched { details: seen_b, your_marker: Marker::O } = b.last() else {
            panic!("B should be matched as O");
        };
        assert_eq!(seen_a.match_id, seen_b.match_id);
        assert_eq!(seen_a.status, MatchStatus::Created);
        let match_id = seen_a.match_id;

        h.confirm(&a, match_id);
        assert!(matches!(b.last(), ServerMessage::Staked { .. }));
        h.confirm(&b, match_id);
        for player in [&mut a, &mut b] {
            let ServerMessage::Start { first_mover, .. } = player.last() else {
                panic!("expected start");
            };
            assert_eq!(first_mover, "0xA");
        }
        assert_eq!(h.coordinator.stats().pre_commitments, 0);

        h.play(&a, match_id, 0, 0, Marker::X);
        h.play(&b, match_id, 1, 1, Marker::O);
        h.play(&a, match_id, 0, 1, Marker::X);
        h.play(&b, match_id, 2, 2, Marker::O);
        let ServerMessage::MoveApplied { next_marker, .. } = a.drain().pop().unwrap() else {
            panic!("expected move_applied");
        };
        assert_eq!(next_marker, Marker::X);
        h.play(&a, match_id, 0, 2, Marker::X);

        for player in [&mut a, &mut b] {
            let ServerMessage::GameOver { outcome, reason, final_board, .. } = player.last() else {
                panic!("expected game_over");
            };
            assert_eq!(reason, CompletionReason::Line);
            assert_eq!(outcome, MatchOutcome::Winner { participant: "0xA".into(), marker: Marker::X });
            assert_eq!(final_board.iter().filter(|c| c.is_some()).count(), 5);
        }

        let m = h.coordinator.get_match(match_id).unwrap();
        assert_eq!(m.status(), MatchStatus::Completed);
        assert_eq!(m.settlement(), SettlementState::Pending);
        let jobs = h.jobs();
        assert_eq!(jobs.len(), 1);
        let LedgerJob::Settlement(request) = &jobs[0] else {
            panic!("expected settlement");
        };
        assert_eq!(request.result, SettlementResult::Winner { participant: "0xA".into() });
        assert_eq!(request.stake_amount, Decimal::from(100));
    }

    #[test]
    fn test_pairs_fifo_and_third_intent_waits() {
        let mut h = harness();
        let mut a = h.player("a");
        let mut b = h.player("b");
        let mut c = h.player("c");
        let mut d = h.player("d");

        h.join(&a, 5);
        h.advance(1);
        h.join(&b, 5);
        h.join(&c, 5);
        h.join(&d, 7);

        assert!(matches!(a.last(), ServerMessage::Matched { .. }));
        assert!(matches!(b.last(), ServerMessage::Matched { .. }));
        assert!(matches!(c.last(), ServerMessage::Waiting { .. }));
        assert!(matches!(d.last(), ServerMessage::Waiting { .. }));

        let stats = h.coordinator.stats();
        assert_eq!(stats.created_matches, 1);
        assert_eq!(stats.waiting_total, 2);
        assert_eq!(stats.queue_depths.len(), 2);
        assert_eq!(stats.pre_commitments, 4);
    }

    #[test]
    fn test_duplicate_intent_rejected() {
        let mut h = harness();
        let mut a = h.player("a");
        h.join(&a, 5);
        h.join(&a, 9);
        let messages = a.drain();
        assert_eq!(error_code(&messages[1]), ErrorCode::DuplicateIntent);
        assert_eq!(h.coordinator.stats().waiting_total, 1);
    }

    #[test]
    fn test_invalid_join_inputs() {
        let mut h = harness();
        let mut a = h.player("a");
        h.join(&a, 0);
        assert_eq!(error_code(&a.last()), ErrorCode::InvalidStake);
        h.send(&a, ClientMessage::JoinIntent {
            participant: "   ".into(),
            stake_amount: Decimal::ONE,
        });
        assert_eq!(error_code(&a.last()), ErrorCode::InvalidParticipant);
        h.send(&a, ClientMessage::Ping);
        assert_eq!(a.last(), ServerMessage::Pong);
    }

    #[test]
    fn test_session_acts_for_one_participant() {
        let mut h = harness();
        let mut a = h.player("a");
        let mut impostor = h.player("x");
        h.join(&a, 5);
        a.drain();

        h.send(&a, ClientMessage::Cancel { participant: "b".into() });
        assert_eq!(error_code(&a.last()), ErrorCode::SessionMismatch);
        h.send(&impostor, ClientMessage::Cancel { participant: "a".into() });
        assert_eq!(error_code(&impostor.last()), ErrorCode::SessionMismatch);
        assert_eq!(h.coordinator.stats().waiting_total, 1);
    }

    #[test]
    fn test_turn_order_enforced() {
        let mut h = harness();
        let mut a = h.player("a");
        let mut b = h.player("b");
        let mut outsider = h.player("z");
        let match_id = h.active(&mut a, &mut b);

        h.play(&b, match_id, 0, 0, Marker::O);
        assert_eq!(error_code(&b.last()), ErrorCode::NotYourTurn);
        h.play(&a, match_id, 0, 0, Marker::O);
        assert_eq!(error_code(&a.last()), ErrorCode::WrongMarker);
        h.play(&a, match_id, 3, 0, Marker::X);
        assert_eq!(error_code(&a.last()), ErrorCode::InvalidCell);
        h.play(&outsider, match_id, 0, 0, Marker::X);
        assert_eq!(error_code(&outsider.last()), ErrorCode::NotParticipant);

        h.play(&a, match_id, 0, 0, Marker::X);
        h.play(&a, match_id, 1, 0, Marker::X);
        assert_eq!(error_code(&a.last()), ErrorCode::NotYourTurn);
        h.play(&b, match_id, 0, 0, Marker::O);
        assert_eq!(error_code(&b.last()), ErrorCode::CellOccupied);

        let m = h.coordinator.get_match(match_id).unwrap();
        assert_eq!(m.moves().len(), 1);
        assert_eq!(m.board().occupied(), 1);
    }

    #[test]
    fn test_move_before_active_rejected() {
        let mut h = harness();
        let mut a = h.player("a");
        let mut b = h.player("b");
        let match_id = h.paired(&mut a, &mut b);
        h.play(&a, match_id, 0, 0, Marker::X);
        assert_eq!(error_code(&a.last()), ErrorCode::NotActive);
    }

    #[test]
    fn test_draw_settles_as_draw() {
        let mut h = harness();
        let mut a = h.player("a");
        let mut b = h.player("b");
        let match_id = h.active(&mut a, &mut b);

        // X O X / X O O / O X X
        for (player, row, col, marker) in [
            (&a, 0, 0, Marker::X),
            (&b, 0, 1, Marker::O),
            (&a, 0, 2, Marker::X),
            (&b, 1, 1, Marker::O),
            (&a, 1, 0, Marker::X),
            (&b, 1, 2, Marker::O),
            (&a, 2, 1, Marker::X),
            (&b, 2, 0, Marker::O),
            (&a, 2, 2, Marker::X),
        ] {
            h.play(player, match_id, row, col, marker);
        }

        let ServerMessage::GameOver { outcome, reason, .. } = b.last() else {
            panic!("expected game_over");
        };
        assert_eq!(outcome, MatchOutcome::Draw);
        assert_eq!(reason, CompletionReason::Draw);
        let jobs = h.jobs();
        assert!(matches!(
            &jobs[..],
            [LedgerJob::Settlement(SettlementRequest { result: SettlementResult::Draw, .. })]
        ));
    }

    #[test]
    fn test_disconnect_during_play_awards_opponent_once() {
        let mut h = harness();
        let mut a = h.player("a");
        let mut b = h.player("b");
        let match_id = h.active(&mut a, &mut b);

        h.coordinator.disconnect(b.session, h.now);
        h.coordinator.disconnect(b.session, h.now);
        h.coordinator.disconnect(a.session, h.now);

        let messages = a.drain();
        assert_eq!(messages.len(), 1);
        let ServerMessage::GameOver { outcome, reason, .. } = &messages[0] else {
            panic!("expected game_over");
        };
        assert_eq!(*reason, CompletionReason::Disconnect);
        assert_eq!(*outcome, MatchOutcome::Winner { participant: "a".into(), marker: Marker::X });
        assert_eq!(h.jobs().len(), 1);
        assert_eq!(
            h.coordinator.get_match(match_id).unwrap().reason(),
            Some(CompletionReason::Disconnect)
        );
    }

    #[test]
    fn test_forfeit_awards_opponent() {
        let mut h = harness();
        let mut a = h.player("a");
        let mut b = h.player("b");
        let match_id = h.active(&mut a, &mut b);

        h.send(&a, ClientMessage::Forfeit { match_id, participant: "a".into() });
        let ServerMessage::GameOver { outcome, reason, .. } = b.last() else {
            panic!("expected game_over");
        };
        assert_eq!(reason, CompletionReason::Forfeit);
        assert_eq!(outcome, MatchOutcome::Winner { participant: "b".into(), marker: Marker::O });

        h.send(&b, ClientMessage::Forfeit { match_id, participant: "b".into() });
        assert_eq!(error_code(&b.last()), ErrorCode::NotActive);
    }

    #[test]
    fn test_disconnect_while_waiting_frees_slot() {
        let mut h = harness();
        let a = h.player("a");
        let mut b = h.player("b");
        h.join(&a, 5);
        h.coordinator.disconnect(a.session, h.now);
        assert_eq!(h.coordinator.stats().waiting_total, 0);
        assert_eq!(h.coordinator.stats().pre_commitments, 0);

        h.join(&b, 5);
        assert!(matches!(b.last(), ServerMessage::Waiting { .. }));
        assert!(h.jobs().is_empty());
    }

    #[test]
    fn test_expired_intent_never_pairs() {
        let mut h = harness();
        let mut a = h.player("a");
        let mut b = h.player("b");
        h.join(&a, 5);
        a.drain();
        h.advance(301);

        // The sweep has not run yet.
        h.join(&b, 5);
        assert!(matches!(b.last(), ServerMessage::Waiting { .. }));
        assert!(matches!(a.last(), ServerMessage::Expired { .. }));
        let jobs = h.jobs();
        assert!(matches!(
            &jobs[..],
            [LedgerJob::Refund(PreStakeRefundRequest { match_id: None, .. })]
        ));
        assert_eq!(h.coordinator.stats().waiting_total, 1);
    }

    #[test]
    fn test_sweep_uses_declared_time() {
        let mut h = harness();
        let mut a = h.player("a");
        let b = h.player("b");
        h.join(&a, 5);
        h.advance(200);
        h.join(&b, 6);

        h.advance(100);
        assert_eq!(h.coordinator.sweep(h.now), 0);
        h.advance(1);
        assert_eq!(h.coordinator.sweep(h.now), 1);
        assert!(matches!(a.last(), ServerMessage::Expired { .. }));
        assert_eq!(h.coordinator.stats().waiting_total, 1);
        h.advance(200);
        assert_eq!(h.coordinator.sweep(h.now), 1);
        assert_eq!(h.coordinator.stats().pre_commitments, 0);
        assert_eq!(h.jobs().len(), 2);
    }

    #[test]
    fn test_expiry_aborts_unstaked_match() {
        let mut h = harness();
        let mut a = h.player("a");
        let mut b = h.player("b");
        let match_id = h.paired(&mut a, &mut b);
        h.confirm(&b, match_id);
        b.drain();
        h.advance(301);
        h.coordinator.sweep(h.now);

        let messages = b.drain();
        assert!(matches!(
            messages.last(),
            Some(ServerMessage::GameOver { outcome: MatchOutcome::Aborted, reason: CompletionReason::Expired, .. })
        ));
        // Both expired together: one refund each, no settlement.
        let jobs = h.jobs();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| matches!(j, LedgerJob::Refund(_))));
        assert_eq!(
            h.coordinator.get_match(match_id).unwrap().settlement(),
            SettlementState::NotRequested
        );
        assert_eq!(h.coordinator.stats().pre_commitments, 0);
    }

    #[test]
    fn test_cancel_paired_aborts_and_noop_when_idle() {
        let mut h = harness();
        let mut a = h.player("a");
        let mut b = h.player("b");
        let match_id = h.paired(&mut a, &mut b);

        h.send(&a, ClientMessage::Cancel { participant: "a".into() });
        assert!(matches!(a.last(), ServerMessage::Cancelled { .. }));
        assert!(matches!(
            b.last(),
            ServerMessage::GameOver { outcome: MatchOutcome::Aborted, reason: CompletionReason::Cancelled, .. }
        ));
        assert_eq!(h.coordinator.stats().pre_commitments, 0);
        assert!(h.jobs().is_empty());

        h.confirm(&b, match_id);
        assert_eq!(error_code(&b.last()), ErrorCode::MatchNotPending);

        h.send(&a, ClientMessage::Cancel { participant: "a".into() });
        assert!(a.drain().is_empty());
    }

    #[test]
    fn test_stake_confirmation_idempotent_and_errors() {
        let mut h = harness();
        let mut a = h.player("a");
        let mut b = h.player("b");
        let mut c = h.player("c");
        let match_id = h.paired(&mut a, &mut b);

        h.confirm(&a, match_id);
        assert_eq!(a.drain().len(), 1);
        h.confirm(&a, match_id);
        assert!(a.drain().is_empty());

        h.confirm(&a, Uuid::nil());
        assert_eq!(error_code(&a.last()), ErrorCode::UnknownMatch);
        h.confirm(&c, match_id);
        assert_eq!(error_code(&c.last()), ErrorCode::NotParticipant);
    }

    #[test]
    fn test_join_while_playing_rejected() {
        let mut h = harness();
        let mut a = h.player("a");
        let mut b = h.player("b");
        h.active(&mut a, &mut b);
        h.join(&a, 100);
        assert_eq!(error_code(&a.last()), ErrorCode::AlreadyInMatch);
    }

    #[test]
    fn test_ledger_confirmations() {
        let mut h = harness();
        let mut a = h.player("a");
        let mut b = h.player("b");
        let match_id = h.paired(&mut a, &mut b);

        let receipt = h
            .coordinator
            .ledger_confirmation(
                LedgerConfirmation::MatchCreated { match_id, external_ref: "0xescrow".into() },
                h.now,
            )
            .unwrap();
        assert!(receipt.applied);

        for participant in ["a", "b"] {
            h.coordinator
                .ledger_confirmation(
                    LedgerConfirmation::Staked {
                        match_id,
                        participant: participant.into(),
                        external_ref: None,
                    },
                    h.now,
                )
                .unwrap();
        }
        assert!(matches!(a.last(), ServerMessage::Start { your_marker: Marker::X, .. }));
        let repeat = h
            .coordinator
            .ledger_confirmation(
                LedgerConfirmation::Staked { match_id, participant: "a".into(), external_ref: None },
                h.now,
            )
            .unwrap();
        assert!(!repeat.applied);

        let view = h.coordinator.match_view(match_id, h.now).unwrap();
        assert_eq!(view.external_ref.as_deref(), Some("0xescrow"));
        assert_eq!(view.status, MatchStatus::Active);

        let err = h
            .coordinator
            .ledger_confirmation(
                LedgerConfirmation::MatchCreated { match_id: Uuid::nil(), external_ref: "x".into() },
                h.now,
            )
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownMatch);
    }

    #[test]
    fn test_settlement_results_reach_players() {
        let mut h = harness();
        let mut a = h.player("a");
        let mut b = h.player("b");
        let match_id = h.active(&mut a, &mut b);
        h.send(&a, ClientMessage::Forfeit { match_id, participant: "a".into() });
        a.drain();
        b.drain();

        let job = h.jobs().pop().unwrap();
        h.coordinator.ledger_finished(job.clone(), Err(LedgerError::Timeout));
        assert!(matches!(a.last(), ServerMessage::SettlementPending { .. }));
        assert_eq!(
            h.coordinator.get_match(match_id).unwrap().settlement(),
            SettlementState::Failed
        );

        h.coordinator
            .ledger_finished(job, Ok(LedgerAck { reference: Some("tx1".into()) }));
        assert_eq!(
            b.last(),
            ServerMessage::Settled { match_id, reference: Some("tx1".into()) }
        );
    }

    #[test]
    fn test_closed_ledger_queue_reported_as_pending() {
        let mut h = harness();
        let mut a = h.player("a");
        let mut b = h.player("b");
        let match_id = h.active(&mut a, &mut b);
        h.jobs.close();

        h.send(&b, ClientMessage::Forfeit { match_id, participant: "b".into() });
        let messages = a.drain();
        assert!(matches!(messages.last(), Some(ServerMessage::SettlementPending { .. })));
        assert_eq!(
            h.coordinator.get_match(match_id).unwrap().settlement(),
            SettlementState::Failed
        );
    }

    #[test]
    fn test_completed_match_evicted_after_retention() {
        let mut h = harness();
        let mut a = h.player("a");
        let mut b = h.player("b");
        let match_id = h.active(&mut a, &mut b);
        h.send(&a, ClientMessage::Forfeit { match_id, participant: "a".into() });

        assert_eq!(h.coordinator.next_eviction(), Some(h.now + Duration::seconds(60)));
        h.advance(59);
        assert!(h.coordinator.evict_due(h.now).is_empty());
        assert!(h.coordinator.match_view(match_id, h.now).is_some());
        h.advance(1);
        assert_eq!(h.coordinator.evict_due(h.now), vec![match_id]);
        assert!(h.coordinator.match_view(match_id, h.now).is_none());
        assert_eq!(h.coordinator.next_eviction(), None);
    }

    #[test]
    fn test_reconnect_rebinds_participant() {
        let mut h = harness();
        let mut a = h.player("a");
        let mut b = h.player("b");
        let match_id = h.paired(&mut a, &mut b);

        // Leaving a CREATED match does not abort it.
        h.coordinator.disconnect(a.session, h.now);
        let mut a2 = h.player("a");
        h.confirm(&a2, match_id);
        h.confirm(&b, match_id);
        assert!(matches!(a2.last(), ServerMessage::Start { .. }));
        assert!(a.drain().is_empty());
    }

    fn ledger_stake(h: &mut Harness, match_id: Uuid, participant: &str) {
        h.coordinator
            .ledger_confirmation(
                LedgerConfirmation::Staked { match_id, participant: participant.into(), external_ref: None },
                h.now,
            )
            .unwrap();
    }

    #[test]
    fn test_ledger_activation_with_departed_participant_completes() {
        let mut h = harness();
        let mut a = h.player("a");
        let mut b = h.player("b");
        let match_id = h.paired(&mut a, &mut b);
        b.drain();

        h.coordinator.disconnect(a.session, h.now);
        ledger_stake(&mut h, match_id, "a");
        ledger_stake(&mut h, match_id, "b");

        let m = h.coordinator.get_match(match_id).unwrap();
        assert_eq!(m.status(), MatchStatus::Completed);
        assert_eq!(m.reason(), Some(CompletionReason::Disconnect));
        let messages = b.drain();
        assert!(!messages.iter().any(|msg| matches!(msg, ServerMessage::Start { .. })));
        let Some(ServerMessage::GameOver { outcome, .. }) = messages.last() else {
            panic!("expected game_over");
        };
        assert_eq!(*outcome, MatchOutcome::Winner { participant: "b".into(), marker: Marker::O });

        let jobs = h.jobs();
        let [LedgerJob::Settlement(request)] = &jobs[..] else {
            panic!("expected one settlement, got {jobs:?}");
        };
        assert_eq!(request.result, SettlementResult::Winner { participant: "b".into() });
        assert_eq!(h.coordinator.stats().active_matches, 0);

        h.join(&b, 100);
        assert!(matches!(b.last(), ServerMessage::Waiting { .. }));
    }

    #[test]
    fn test_ledger_activation_with_both_departed_settles_draw() {
        let mut h = harness();
        let mut a = h.player("a");
        let mut b = h.player("b");
        let match_id = h.paired(&mut a, &mut b);

        h.coordinator.disconnect(a.session, h.now);
        h.coordinator.disconnect(b.session, h.now);
        ledger_stake(&mut h, match_id, "a");
        ledger_stake(&mut h, match_id, "b");

        let m = h.coordinator.get_match(match_id).unwrap();
        assert_eq!(m.status(), MatchStatus::Completed);
        assert_eq!(m.outcome(), Some(&MatchOutcome::Draw));
        let jobs = h.jobs();
        assert!(matches!(
            &jobs[..],
            [LedgerJob::Settlement(SettlementRequest { result: SettlementResult::Draw, .. })]
        ));
    }

    #[test]
    fn test_query_with_departed_caller_keeps_running() {
        let mut h = harness();
        let mut a = h.player("a");
        let mut b = h.player("b");
        let match_id = h.paired(&mut a, &mut b);

        let (reply, rx) = tokio::sync::oneshot::channel();
        drop(rx);
        h.coordinator
            .handle_event(CoordinatorEvent::Query(CoordinatorQuery::Stats { reply }), h.now);
        let (reply, rx) = tokio::sync::oneshot::channel();
        drop(rx);
        h.coordinator.handle_event(
            CoordinatorEvent::Query(CoordinatorQuery::Match { match_id, reply }),
            h.now,
        );

        let (reply, mut rx) = tokio::sync::oneshot::channel();
        h.coordinator
            .handle_event(CoordinatorEvent::Query(CoordinatorQuery::Stats { reply }), h.now);
        assert_eq!(rx.try_recv().unwrap().pre_commitments, 2);
        h.confirm(&a, match_id);
        assert!(matches!(b.last(), ServerMessage::Staked { .. }));
    }

    struct FirstMarkWins;

    impl GameRules for FirstMarkWins {
        fn name(&self) -> &'static str {
            "first-mark-wins"
        }

        fn dimensions(&self) -> (u8, u8) {
            (1, 2)
        }

        fn evaluate_win(&self, board: &Board, marker: Marker) -> bool {
            board.cells().contains(&Some(marker))
        }

        fn evaluate_draw(&self, _board: &Board) -> bool {
            false
        }
    }

    #[test]
    fn test_rules_are_injected() {
        let mut h = harness_with(Arc::new(FirstMarkWins));
        let mut a = h.player("a");
        let mut b = h.player("b");
        let match_id = h.active(&mut a, &mut b);

        h.play(&a, match_id, 1, 0, Marker::X);
        assert_eq!(error_code(&a.last()), ErrorCode::InvalidCell);
        h.play(&a, match_id, 0, 1, Marker::X);
        let ServerMessage::GameOver { final_board, outcome, .. } = b.last() else {
            panic!("expected game_over");
        };
        assert_eq!(final_board, vec![None, Some(Marker::X)]);
        assert_eq!(outcome, MatchOutcome::Winner { participant: "a".into(), marker: Marker::X });
    }
}
