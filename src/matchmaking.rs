// FIFO matchmaking queue: pairs a requester with the longest-waiting
// compatible player, or parks the requester until someone arrives.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::duel::{DuelError, DuelId};
use crate::engine::server::DuelEngine;
use crate::metrics;
use crate::players::PlayerId;
use crate::rating::within_window;

/// A player waiting for an opponent.
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    pub player_id: PlayerId,
    pub rating: i32,
    pub ranked: bool,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(player_id: PlayerId, rating: i32, ranked: bool) -> Self {
        Self {
            player_id,
            rating,
            ranked,
            enqueued_at: Utc::now(),
        }
    }

    /// Casual entries pair with any casual entry; ranked entries also need
    /// ratings within the window.
    fn compatible(&self, other: &QueueEntry, window: i32) -> bool {
        self.player_id != other.player_id
            && self.ranked == other.ranked
            && (!self.ranked || within_window(self.rating, other.rating, window))
    }
}

/// Status of the matchmaking queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub depth: usize,
    pub ranked: usize,
    pub casual: usize,
}

/// Result of a scan-or-enqueue step.
#[derive(Debug, Clone)]
pub enum Pairing {
    Opponent(QueueEntry),
    /// Queued at this 1-based position.
    Waiting(usize),
}

/// Thread-safe FIFO matchmaking queue.
#[derive(Debug, Clone, Default)]
pub struct MatchQueue {
    inner: Arc<Mutex<VecDeque<QueueEntry>>>,
}

impl MatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<QueueEntry>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the first compatible waiting entry, or enqueue `entry` if there
    /// is none. Both happen under one lock so two requesters cannot miss
    /// each other.
    pub fn pair_or_wait(&self, entry: QueueEntry, window: i32) -> Pairing {
        let mut queue = self.lock();
        queue.retain(|e| e.player_id != entry.player_id);

        let found = queue.iter().position(|e| entry.compatible(e, window));
        let pairing = match found.and_then(|i| queue.remove(i)) {
            Some(opponent) => Pairing::Opponent(opponent),
            None => {
                queue.push_back(entry);
                Pairing::Waiting(queue.len())
            }
        };
        metrics::MATCHMAKING_QUEUE_DEPTH.set(queue.len() as i64);
        pairing
    }

    /// Put a popped entry back at the head, keeping its original wait time.
    pub fn requeue_front(&self, entry: QueueEntry) {
        let mut queue = self.lock();
        queue.retain(|e| e.player_id != entry.player_id);
        queue.push_front(entry);
        metrics::MATCHMAKING_QUEUE_DEPTH.set(queue.len() as i64);
    }

    /// Leave the queue. Returns whether the player was waiting.
    pub fn remove(&self, player: PlayerId) -> bool {
        let mut queue = self.lock();
        let before = queue.len();
        queue.retain(|e| e.player_id != player);
        metrics::MATCHMAKING_QUEUE_DEPTH.set(queue.len() as i64);
        queue.len() != before
    }

    /// 1-based position of a waiting player.
    pub fn position(&self, player: PlayerId) -> Option<usize> {
        self.lock()
            .iter()
            .position(|e| e.player_id == player)
            .map(|i| i + 1)
    }

    pub fn depth(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn status(&self) -> QueueStatus {
        let queue = self.lock();
        let ranked = queue.iter().filter(|e| e.ranked).count();
        QueueStatus {
            depth: queue.len(),
            ranked,
            casual: queue.len() - ranked,
        }
    }
}

/// Outcome of a matchmaking request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MatchmakingOutcome {
    Matched { duel_id: DuelId, opponent: PlayerId },
    Queued { position: usize },
}

/// Pair `player` with a waiting opponent and start the duel, or queue them.
pub fn request_duel(
    engine: &DuelEngine,
    queue: &MatchQueue,
    player: PlayerId,
    ranked: bool,
    window: i32,
) -> Result<MatchmakingOutcome, DuelError> {
    let rating = engine
        .directory()
        .rating(player)
        .ok_or(DuelError::UnknownParticipant(player))?;
    if engine.active_duel_for(player).is_some() {
        return Err(DuelError::ParticipantBusy(player));
    }

    loop {
        let entry = QueueEntry::new(player, rating, ranked);
        let opponent = match queue.pair_or_wait(entry, window) {
            Pairing::Waiting(position) => {
                tracing::debug!(player, ranked, position, "Queued for matchmaking");
                return Ok(MatchmakingOutcome::Queued { position });
            }
            Pairing::Opponent(entry) => entry,
        };

        if let Some(outcome) = start_paired(engine, queue, opponent, player, ranked)? {
            return Ok(outcome);
        }
    }
}

/// Start the duel between a popped `opponent` and `player`. `Ok(None)` means
/// the opponent was busy and has been dropped, so the caller should rescan.
/// Any other failure puts the opponent back at the head of the queue.
fn start_paired(
    engine: &DuelEngine,
    queue: &MatchQueue,
    opponent: QueueEntry,
    player: PlayerId,
    ranked: bool,
) -> Result<Option<MatchmakingOutcome>, DuelError> {
    let opponent_id = opponent.player_id;
    match engine.create_duel(opponent_id, player, ranked) {
        Ok(duel_id) => {
            tracing::info!(player, opponent = opponent_id, ranked, "Matchmaking paired players");
            Ok(Some(MatchmakingOutcome::Matched {
                duel_id,
                opponent: opponent_id,
            }))
        }
        // The waiting player got into a duel some other way; drop them and rescan.
        Err(DuelError::ParticipantBusy(busy)) if busy == opponent_id => {
            tracing::debug!(opponent = opponent_id, "Dropping busy player from queue");
            Ok(None)
        }
        Err(e) => {
            tracing::debug!(opponent = opponent_id, error = %e, "Pairing failed, requeueing");
            queue.requeue_front(opponent);
            Err(e)
        }
    }
}
