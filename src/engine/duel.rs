// A live duel between two players and its round state machine.

use std::time::Instant;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::config::{DUEL_ID_SUFFIX_LEN, FIRST_ROUND, MAX_HEALTH};
use super::moves::{Move, MoveCatalog};
use super::resolve::{resolve_round, LingeringEffect, ParticipantHealth, RoundResolution, Side};
use crate::players::PlayerId;

/// Errors returned to the caller of duel operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DuelError {
    #[error("a player cannot duel themselves")]
    InvalidParticipants,
    #[error("duel not found")]
    DuelNotFound,
    #[error("player {0} is not a participant of this duel")]
    UnknownParticipant(PlayerId),
    #[error("move '{0}' is not available to this player")]
    InvalidMove(String),
    #[error("round is being resolved, retry shortly")]
    ChoiceAlreadyResolving,
    #[error("player {0} is already in an active duel")]
    ParticipantBusy(PlayerId),
}

impl DuelError {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            DuelError::InvalidParticipants => "invalid_participants",
            DuelError::DuelNotFound => "duel_not_found",
            DuelError::UnknownParticipant(_) => "unknown_participant",
            DuelError::InvalidMove(_) => "invalid_move",
            DuelError::ChoiceAlreadyResolving => "already_resolving",
            DuelError::ParticipantBusy(_) => "participant_busy",
        }
    }
}

/// Unique duel identifier: both participant ids plus a random suffix, so a
/// rematch between the same pair never reuses the id of an earlier duel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DuelId(String);

impl DuelId {
    pub fn generate(a: PlayerId, b: PlayerId) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("duel-{a}-{b}-{}", &suffix[..DUEL_ID_SUFFIX_LEN]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DuelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DuelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for DuelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuelState {
    AwaitingChoices,
    Resolving,
    Finished,
}

/// Read-only view of a duel for presentation.
#[derive(Debug, Clone, Serialize)]
pub struct DuelSnapshot {
    pub id: DuelId,
    pub participants: [PlayerId; 2],
    pub health: [ParticipantHealth; 2],
    pub round: u32,
    pub state: DuelState,
    pub ranked: bool,
    /// Participants that already chose a move this round.
    pub submitted: Vec<PlayerId>,
    pub effects: [Vec<LingeringEffect>; 2],
    pub created_at: DateTime<Utc>,
}

pub struct Duel {
    pub id: DuelId,
    pub participants: [PlayerId; 2],
    pub health: [i32; 2],
    pub pending: [Option<String>; 2],
    pub effects: [Vec<LingeringEffect>; 2],
    pub round: u32,
    pub ranked: bool,
    pub state: DuelState,
    pub created_at: DateTime<Utc>,
    pub round_started_at: Instant,
    rng: StdRng,
}

impl Duel {
    pub fn new(
        id: DuelId,
        a: PlayerId,
        b: PlayerId,
        ranked: bool,
        rng: StdRng,
    ) -> Result<Self, DuelError> {
        if a == b {
            return Err(DuelError::InvalidParticipants);
        }
        Ok(Self {
            id,
            participants: [a, b],
            health: [MAX_HEALTH; 2],
            pending: [None, None],
            effects: [Vec::new(), Vec::new()],
            round: FIRST_ROUND,
            ranked,
            state: DuelState::AwaitingChoices,
            created_at: Utc::now(),
            round_started_at: Instant::now(),
            rng,
        })
    }

    pub fn seat_of(&self, player: PlayerId) -> Option<usize> {
        self.participants.iter().position(|&p| p == player)
    }

    /// Record a choice for the current round. Returns true when both
    /// participants have chosen and the duel moved to `Resolving`.
    pub fn record_choice(&mut self, player: PlayerId, move_id: &str) -> Result<bool, DuelError> {
        match self.state {
            DuelState::Finished => return Err(DuelError::DuelNotFound),
            DuelState::Resolving => return Err(DuelError::ChoiceAlreadyResolving),
            DuelState::AwaitingChoices => {}
        }
        let seat = self
            .seat_of(player)
            .ok_or(DuelError::UnknownParticipant(player))?;
        self.pending[seat] = Some(move_id.to_string());

        if self.pending.iter().all(Option::is_some) {
            self.state = DuelState::Resolving;
            return Ok(true);
        }
        Ok(false)
    }

    /// Resolve the pending choices. Only valid in `Resolving`; leaves the duel
    /// in `AwaitingChoices` for the next round or `Finished`.
    pub fn resolve(&mut self, catalog: &MoveCatalog) -> Result<RoundResolution, DuelError> {
        if self.state != DuelState::Resolving {
            return Err(DuelError::ChoiceAlreadyResolving);
        }
        let first = pending_move(catalog, &self.pending[0])?;
        let second = pending_move(catalog, &self.pending[1])?;

        let resolution = resolve_round(
            self.round,
            [
                Side {
                    player: self.participants[0],
                    health: self.health[0],
                    choice: first,
                    effects: &self.effects[0],
                },
                Side {
                    player: self.participants[1],
                    health: self.health[1],
                    choice: second,
                    effects: &self.effects[1],
                },
            ],
            &mut self.rng,
        );

        self.health = resolution.health;
        self.effects = resolution.effects.clone();
        self.pending = [None, None];

        if self.health.iter().any(|&hp| hp <= 0) {
            self.state = DuelState::Finished;
        } else {
            self.round += 1;
            self.round_started_at = Instant::now();
            self.state = DuelState::AwaitingChoices;
        }
        Ok(resolution)
    }

    /// Participants that have not chosen a move this round.
    pub fn waiting_on(&self) -> Vec<PlayerId> {
        self.participants
            .iter()
            .zip(self.pending.iter())
            .filter(|(_, choice)| choice.is_none())
            .map(|(&p, _)| p)
            .collect()
    }

    pub(crate) fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn snapshot(&self) -> DuelSnapshot {
        DuelSnapshot {
            id: self.id.clone(),
            participants: self.participants,
            health: [0usize, 1].map(|i| ParticipantHealth {
                player: self.participants[i],
                health: self.health[i].max(0),
            }),
            round: self.round,
            state: self.state,
            ranked: self.ranked,
            submitted: self
                .participants
                .iter()
                .zip(self.pending.iter())
                .filter(|(_, choice)| choice.is_some())
                .map(|(&p, _)| p)
                .collect(),
            effects: self.effects.clone(),
            created_at: self.created_at,
        }
    }
}

fn pending_move<'c>(
    catalog: &'c MoveCatalog,
    choice: &Option<String>,
) -> Result<&'c Move, DuelError> {
    let id = choice.as_deref().unwrap_or_default();
    catalog
        .get(id)
        .ok_or_else(|| DuelError::InvalidMove(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn catalog() -> MoveCatalog {
        MoveCatalog::new(vec![
            Move::attack("strike", 3, 0.0),
            Move::attack("smash", 10, 0.0),
            Move::defense("shield", 2, Some(1)),
            Move::heal("bandage", 2),
        ])
        .unwrap()
    }

    fn duel(a: PlayerId, b: PlayerId) -> Duel {
        Duel::new(DuelId::generate(a, b), a, b, false, StdRng::seed_from_u64(1)).unwrap()
    }

    #[test]
    fn test_new_duel_defaults() {
        let d = duel(1, 2);
        assert_eq!(d.health, [10, 10]);
        assert_eq!(d.round, 1);
        assert_eq!(d.state, DuelState::AwaitingChoices);
        assert_eq!(d.waiting_on(), vec![1, 2]);
    }

    #[test]
    fn test_same_participant_rejected() {
        let result = Duel::new(DuelId::from("x"), 3, 3, true, StdRng::seed_from_u64(1));
        assert!(matches!(result, Err(DuelError::InvalidParticipants)));
    }

    #[test]
    fn test_duel_ids_differ_for_rematch() {
        let first = DuelId::generate(1, 2);
        let second = DuelId::generate(1, 2);
        assert_ne!(first, second);
        assert!(first.as_str().starts_with("duel-1-2-"));
        assert_eq!(first.as_str().len(), "duel-1-2-".len() + 8);
    }

    #[test]
    fn test_choice_from_stranger_rejected() {
        let mut d = duel(1, 2);
        assert_eq!(
            d.record_choice(9, "strike"),
            Err(DuelError::UnknownParticipant(9))
        );
    }

    #[test]
    fn test_round_lifecycle() {
        let catalog = catalog();
        let mut d = duel(1, 2);
        assert_eq!(d.record_choice(1, "strike"), Ok(false));
        assert_eq!(d.snapshot().submitted, vec![1]);
        // Changing one's mind before the opponent commits replaces the choice.
        assert_eq!(d.record_choice(1, "strike"), Ok(false));
        assert_eq!(d.record_choice(2, "shield"), Ok(true));
        assert_eq!(d.state, DuelState::Resolving);
        assert_eq!(
            d.record_choice(1, "strike"),
            Err(DuelError::ChoiceAlreadyResolving)
        );

        let resolution = d.resolve(&catalog).unwrap();
        assert_eq!(resolution.log.round, 1);
        assert_eq!(d.health, [9, 9]);
        assert_eq!(d.round, 2);
        assert_eq!(d.state, DuelState::AwaitingChoices);
        assert_eq!(d.pending, [None, None]);
    }

    #[test]
    fn test_resolve_requires_both_choices() {
        let catalog = catalog();
        let mut d = duel(1, 2);
        d.record_choice(1, "strike").unwrap();
        assert!(d.resolve(&catalog).is_err());
    }

    #[test]
    fn test_knockout_finishes() {
        let catalog = catalog();
        let mut d = duel(1, 2);
        d.record_choice(1, "smash").unwrap();
        d.record_choice(2, "bandage").unwrap();
        d.resolve(&catalog).unwrap();
        assert_eq!(d.state, DuelState::Finished);
        assert_eq!(d.round, 1);
        assert_eq!(d.record_choice(1, "strike"), Err(DuelError::DuelNotFound));
    }

    #[test]
    fn test_snapshot_never_negative() {
        let catalog = catalog();
        let mut d = duel(1, 2);
        d.health = [1, 10];
        d.record_choice(1, "bandage").unwrap();
        d.record_choice(2, "smash").unwrap();
        let resolution = d.resolve(&catalog).unwrap();
        assert_eq!(resolution.raw_health[0], -7);
        let snap = d.snapshot();
        assert_eq!(snap.health[0].health, 0);
        assert_eq!(snap.state, DuelState::Finished);
    }
}
