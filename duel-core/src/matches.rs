//! Match table: the authoritative record of every match from creation to
//! eviction, and the match state machine.
//!
//! ```text
//! CREATED --(both staked)--> ACTIVE --(line | draw | forfeit | disconnect)--> COMPLETED
//!    \--------------------(expired | cancelled, aborted)----------------------^
//! ```
//!
//! `mark_staked` is the only way into ACTIVE. Fields are private so callers go
//! through the table's operations and the invariants below always hold:
//! a non-empty cell never changes, and the move sequence length equals the
//! number of occupied cells.

use crate::rules::{Board, GameRules, PlaceError};
use duel_sdk::objects::{
    CompletionReason, MatchOutcome, MatchStatus, MatchView, Marker, MoveView, ParticipantAddress,
    SettlementState,
};
use rust_decimal::Decimal;
use smallvec::SmallVec;
use std::collections::HashMap;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRecord {
    pub participant: ParticipantAddress,
    pub row: u8,
    pub col: u8,
    pub marker: Marker,
}

#[derive(Debug, Clone)]
pub struct Match {
    id: Uuid,
    participant_a: ParticipantAddress,
    participant_b: ParticipantAddress,
    stake: Decimal,
    status: MatchStatus,
    board: Board,
    moves: SmallVec<[MoveRecord; 9]>,
    staked_a: bool,
    staked_b: bool,
    external_ref: Option<String>,
    created_at: OffsetDateTime,
    active_since: Option<OffsetDateTime>,
    completed_at: Option<OffsetDateTime>,
    outcome: Option<MatchOutcome>,
    reason: Option<CompletionReason>,
    settlement: SettlementState,
}

impl Match {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn participant_a(&self) -> &ParticipantAddress {
        &self.participant_a
    }

    pub fn participant_b(&self) -> &ParticipantAddress {
        &self.participant_b
    }

    pub fn stake(&self) -> Decimal {
        self.stake
    }

    pub fn status(&self) -> MatchStatus {
        self.status
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn moves(&self) -> &[MoveRecord] {
        &self.moves
    }

    pub fn external_ref(&self) -> Option<&str> {
        self.external_ref.as_deref()
    }

    pub fn outcome(&self) -> Option<&MatchOutcome> {
        self.outcome.as_ref()
    }

    pub fn reason(&self) -> Option<CompletionReason> {
        self.reason
    }

    pub fn settlement(&self) -> SettlementState {
        self.settlement
    }

    pub fn active_since(&self) -> Option<OffsetDateTime> {
        self.active_since
    }

    pub fn is_participant(&self, participant: &str) -> bool {
        self.participant_a == participant || self.participant_b == participant
    }

    pub fn is_staked(&self, participant: &str) -> bool {
        if self.participant_a == participant {
            self.staked_a
        } else if self.participant_b == participant {
            self.staked_b
        } else {
            false
        }
    }

    /// Participant A plays `X`, participant B plays `O`.
    pub fn marker_of(&self, participant: &str) -> Option<Marker> {
        if self.participant_a == participant {
            Some(Marker::X)
        } else if self.participant_b == participant {
            Some(Marker::O)
        } else {
            None
        }
    }

    pub fn participant_of(&self, marker: Marker) -> &ParticipantAddress {
        match marker {
            Marker::X => &self.participant_a,
            Marker::O => &self.participant_b,
        }
    }

    pub fn opponent_of(&self, participant: &str) -> Option<&ParticipantAddress> {
        if self.participant_a == participant {
            Some(&self.participant_b)
        } else if self.participant_b == participant {
            Some(&self.participant_a)
        } else {
            None
        }
    }

    /// Marker expected next, by move parity. `None` unless ACTIVE.
    pub fn next_marker(&self) -> Option<Marker> {
        (self.status == MatchStatus::Active).then(|| {
            if self.moves.len() % 2 == 0 {
                Marker::X
            } else {
                Marker::O
            }
        })
    }

    /// Time spent ACTIVE, frozen at completion.
    pub fn active_for(&self, now: OffsetDateTime) -> Option<time::Duration> {
        let since = self.active_since?;
        Some(self.completed_at.unwrap_or(now) - since)
    }

    pub fn view(&self, now: OffsetDateTime) -> MatchView {
        MatchView {
            match_id: self.id,
            participant_a: self.participant_a.clone(),
            participant_b: self.participant_b.clone(),
            stake_amount: self.stake,
            status: self.status,
            rows: self.board.rows(),
            cols: self.board.cols(),
            board: self.board.cells().to_vec(),
            moves: self
                .moves
                .iter()
                .map(|m| MoveView {
                    participant: m.participant.clone(),
                    row: m.row,
                    col: m.col,
                    marker: m.marker,
                })
                .collect(),
            staked_a: self.staked_a,
            staked_b: self.staked_b,
            next_marker: self.next_marker(),
            external_ref: self.external_ref.clone(),
            created_at: self.created_at.unix_timestamp(),
            active_since: self.active_since.map(OffsetDateTime::unix_timestamp),
            active_for_secs: self.active_for(now).map(|d| d.whole_seconds()),
            completed_at: self.completed_at.map(OffsetDateTime::unix_timestamp),
            outcome: self.outcome.clone(),
            reason: self.reason,
            settlement: self.settlement,
        }
    }
}

/// Result of an accepted move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Continue { next_marker: Marker },
    Win { marker: Marker },
    Draw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    #[error("match not found")]
    UnknownMatch,
    #[error("match is not active")]
    NotActive,
    #[error("cell is already occupied")]
    CellOccupied,
    #[error("cell is outside the board")]
    CellOutOfRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StakeError {
    #[error("match not found")]
    UnknownMatch,
    #[error("not a participant of this match")]
    NotParticipant,
    #[error("match is already completed")]
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FinalizeError {
    #[error("match not found")]
    UnknownMatch,
    #[error("match is already completed")]
    AlreadyCompleted,
}

/// Effect of a `mark_staked` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakeMark {
    /// False when the participant had already staked.
    pub newly_staked: bool,
    /// True exactly once: on the call that made the match ACTIVE.
    pub activated: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchCounts {
    pub created: usize,
    pub active: usize,
    pub completed: usize,
}

#[derive(Debug, Default)]
pub struct MatchTable {
    matches: HashMap<Uuid, Match>,
    /// Participants of CREATED and ACTIVE matches.
    by_participant: HashMap<ParticipantAddress, Uuid>,
}

impl MatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a CREATED match for two freshly paired participants.
    pub fn create(
        &mut self,
        participant_a: ParticipantAddress,
        participant_b: ParticipantAddress,
        stake: Decimal,
        board: Board,
        now: OffsetDateTime,
    ) -> &Match {
        let id = Uuid::now_v7();
        self.by_participant.insert(participant_a.clone(), id);
        self.by_participant.insert(participant_b.clone(), id);
        self.matches.entry(id).or_insert(Match {
            id,
            participant_a,
            participant_b,
            stake,
            status: MatchStatus::Created,
            board,
            moves: SmallVec::new(),
            staked_a: false,
            staked_b: false,
            external_ref: None,
            created_at: now,
            active_since: None,
            completed_at: None,
            outcome: None,
            reason: None,
            settlement: SettlementState::NotRequested,
        })
    }

    pub fn get(&self, id: Uuid) -> Option<&Match> {
        self.matches.get(&id)
    }

    /// The CREATED or ACTIVE match `participant` belongs to.
    pub fn open_match_of(&self, participant: &str) -> Option<&Match> {
        self.by_participant
            .get(participant)
            .and_then(|id| self.matches.get(id))
    }

    /// Record `participant`'s stake. Idempotent; activates the match when
    /// both flags become true.
    pub fn mark_staked(
        &mut self,
        id: Uuid,
        participant: &str,
        now: OffsetDateTime,
    ) -> Result<StakeMark, StakeError> {
        let m = self.matches.get_mut(&id).ok_or(StakeError::UnknownMatch)?;
        if !m.is_participant(participant) {
            return Err(StakeError::NotParticipant);
        }
        if m.status == MatchStatus::Completed {
            return Err(StakeError::Completed);
        }
        let flag = if m.participant_a == participant {
            &mut m.staked_a
        } else {
            &mut m.staked_b
        };
        let newly_staked = !*flag;
        *flag = true;

        let activated = m.status == MatchStatus::Created && m.staked_a && m.staked_b;
        if activated {
            m.status = MatchStatus::Active;
            m.active_since = Some(now);
        }
        Ok(StakeMark {
            newly_staked,
            activated,
        })
    }

    /// Place `marker` at `cell_index` and evaluate the board. Turn order is
    /// not checked here.
    pub fn apply_move(
        &mut self,
        id: Uuid,
        cell_index: usize,
        marker: Marker,
        rules: &dyn GameRules,
    ) -> Result<MoveOutcome, MoveError> {
        let m = self.matches.get_mut(&id).ok_or(MoveError::UnknownMatch)?;
        if m.status != MatchStatus::Active {
            return Err(MoveError::NotActive);
        }
        m.board.place(cell_index, marker).map_err(|e| match e {
            PlaceError::Occupied => MoveError::CellOccupied,
            PlaceError::OutOfRange => MoveError::CellOutOfRange,
        })?;
        let cols = usize::from(m.board.cols().max(1));
        let record = MoveRecord {
            participant: m.participant_of(marker).clone(),
            row: (cell_index / cols) as u8,
            col: (cell_index % cols) as u8,
            marker,
        };
        m.moves.push(record);

        if rules.evaluate_win(&m.board, marker) {
            Ok(MoveOutcome::Win { marker })
        } else if rules.evaluate_draw(&m.board) {
            Ok(MoveOutcome::Draw)
        } else {
            Ok(MoveOutcome::Continue {
                next_marker: marker.opponent(),
            })
        }
    }

    /// Move the match to COMPLETED. A second call fails with
    /// [`FinalizeError::AlreadyCompleted`] and changes nothing.
    pub fn finalize(
        &mut self,
        id: Uuid,
        outcome: MatchOutcome,
        reason: CompletionReason,
        now: OffsetDateTime,
    ) -> Result<&Match, FinalizeError> {
        let m = self.matches.get_mut(&id).ok_or(FinalizeError::UnknownMatch)?;
        if m.status == MatchStatus::Completed {
            return Err(FinalizeError::AlreadyCompleted);
        }
        m.status = MatchStatus::Completed;
        m.completed_at = Some(now);
        m.outcome = Some(outcome);
        m.reason = Some(reason);
        for participant in [&m.participant_a, &m.participant_b] {
            if self.by_participant.get(participant) == Some(&id) {
                self.by_participant.remove(participant);
            }
        }
        Ok(m)
    }

    pub fn evict(&mut self, id: Uuid) -> Option<Match> {
        let m = self.matches.remove(&id)?;
        for participant in [&m.participant_a, &m.participant_b] {
            if self.by_participant.get(participant) == Some(&id) {
                self.by_participant.remove(participant);
            }
        }
        Some(m)
    }

    pub fn set_external_ref(&mut self, id: Uuid, external_ref: &str) -> bool {
        match self.matches.get_mut(&id) {
            Some(m) => {
                m.external_ref = Some(external_ref.to_owned());
                true
            }
            None => false,
        }
    }

    pub fn set_settlement(&mut self, id: Uuid, state: SettlementState) -> bool {
        match self.matches.get_mut(&id) {
            Some(m) => {
                m.settlement = state;
                true
            }
            None => false,
        }
    }

    pub fn counts(&self) -> MatchCounts {
        self.matches
            .values()
            .fold(MatchCounts::default(), |mut acc, m| {
                match m.status {
                    MatchStatus::Created => acc.created += 1,
                    MatchStatus::Active => acc.active += 1,
                    MatchStatus::Completed => acc.completed += 1,
                }
                acc
            })
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::TicTacToe;
    use compact_str::CompactString;

    fn table_with_match() -> (MatchTable, Uuid) {
        let mut table = MatchTable::new();
        let id = table
            .create(
                CompactString::from("alice"),
                CompactString::from("bob"),
                Decimal::from(100),
                TicTacToe.new_board(),
                OffsetDateTime::UNIX_EPOCH,
            )
            .id();
        (table, id)
    }

    fn activate(table: &mut MatchTable, id: Uuid) {
        table.mark_staked(id, "alice", OffsetDateTime::UNIX_EPOCH).unwrap();
        table.mark_staked(id, "bob", OffsetDateTime::UNIX_EPOCH).unwrap();
    }

    #[test]
    fn test_mark_staked_is_idempotent_and_activates_once() {
        let (mut table, id) = table_with_match();
        let now = OffsetDateTime::UNIX_EPOCH;

        let first = table.mark_staked(id, "alice", now).unwrap();
        assert_eq!(first, StakeMark { newly_staked: true, activated: false });
        let again = table.mark_staked(id, "alice", now).unwrap();
        assert_eq!(again, StakeMark { newly_staked: false, activated: false });
        assert_eq!(table.get(id).unwrap().status(), MatchStatus::Created);

        let second = table.mark_staked(id, "bob", now).unwrap();
        assert!(second.activated);
        assert_eq!(table.get(id).unwrap().status(), MatchStatus::Active);
        assert!(!table.mark_staked(id, "bob", now).unwrap().activated);

        assert_eq!(
            table.mark_staked(id, "mallory", now),
            Err(StakeError::NotParticipant)
        );
        assert_eq!(
            table.mark_staked(Uuid::nil(), "alice", now),
            Err(StakeError::UnknownMatch)
        );
    }

    #[test]
    fn test_apply_move_requires_active() {
        let (mut table, id) = table_with_match();
        assert_eq!(
            table.apply_move(id, 0, Marker::X, &TicTacToe),
            Err(MoveError::NotActive)
        );
        assert!(table.get(id).unwrap().moves().is_empty());
    }

    #[test]
    fn test_occupied_cell_rejected_without_mutation() {
        let (mut table, id) = table_with_match();
        activate(&mut table, id);

        assert_eq!(
            table.apply_move(id, 4, Marker::X, &TicTacToe),
            Ok(MoveOutcome::Continue { next_marker: Marker::O })
        );
        assert_eq!(
            table.apply_move(id, 4, Marker::O, &TicTacToe),
            Err(MoveError::CellOccupied)
        );
        assert_eq!(
            table.apply_move(id, 9, Marker::O, &TicTacToe),
            Err(MoveError::CellOutOfRange)
        );
        let m = table.get(id).unwrap();
        assert_eq!(m.moves().len(), 1);
        assert_eq!(m.board().occupied(), m.moves().len());
        assert_eq!(m.moves()[0].row, 1);
        assert_eq!(m.moves()[0].col, 1);
        assert_eq!(m.next_marker(), Some(Marker::O));
    }

    #[test]
    fn test_win_and_finalize_once() {
        let (mut table, id) = table_with_match();
        activate(&mut table, id);
        for (index, marker) in [(0, Marker::X), (4, Marker::O), (1, Marker::X), (8, Marker::O)] {
            table.apply_move(id, index, marker, &TicTacToe).unwrap();
        }
        assert_eq!(
            table.apply_move(id, 2, Marker::X, &TicTacToe),
            Ok(MoveOutcome::Win { marker: Marker::X })
        );

        let outcome = MatchOutcome::Winner {
            participant: CompactString::from("alice"),
            marker: Marker::X,
        };
        let later = OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(42);
        table
            .finalize(id, outcome.clone(), CompletionReason::Line, later)
            .unwrap();
        assert_eq!(
            table
                .finalize(id, MatchOutcome::Draw, CompletionReason::Draw, later)
                .unwrap_err(),
            FinalizeError::AlreadyCompleted
        );

        let view = table.get(id).unwrap().view(later + time::Duration::seconds(100));
        assert_eq!(view.status, MatchStatus::Completed);
        assert_eq!(view.outcome, Some(outcome));
        assert_eq!(view.active_for_secs, Some(42));
        assert_eq!(view.next_marker, None);
        assert!(table.open_match_of("alice").is_none());
        assert_eq!(
            table.mark_staked(id, "alice", later),
            Err(StakeError::Completed)
        );
    }

    #[test]
    fn test_counts_and_evict() {
        let (mut table, id) = table_with_match();
        assert_eq!(table.counts().created, 1);
        assert_eq!(table.open_match_of("bob").unwrap().id(), id);
        activate(&mut table, id);
        assert_eq!(table.counts().active, 1);

        assert!(table.evict(id).is_some());
        assert!(table.evict(id).is_none());
        assert!(table.is_empty());
        assert!(table.open_match_of("alice").is_none());
    }
}
