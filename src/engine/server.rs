// Duel engine: owns the active-duel registry, serializes work per duel and
// broadcasts duel events to WebSocket subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::metrics;
use crate::players::{PlayerDirectory, PlayerId};
use crate::replay::{ReplayRecorder, ReplayStore};

use super::config::EVENT_CHANNEL_CAPACITY;
use super::duel::{Duel, DuelError, DuelId, DuelSnapshot, DuelState};
use super::moves::{Move, MoveCatalog};
use super::resolve::{BattleLog, ParticipantHealth};
use super::settlement::{pick_winner, settle, Finish, FinishReason, SettlementResult};

/// Messages broadcast to subscribers and recorded into replays.
#[derive(Clone, Serialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DuelEvent {
    DuelStarted {
        duel_id: DuelId,
        participants: [PlayerId; 2],
        ranked: bool,
    },
    ChoiceSubmitted {
        duel_id: DuelId,
        player_id: PlayerId,
        round: u32,
    },
    RoundResolved {
        duel_id: DuelId,
        log: BattleLog,
        lines: Vec<String>,
        health: [ParticipantHealth; 2],
    },
    DuelFinished {
        duel_id: DuelId,
        log: Option<BattleLog>,
        settlement: SettlementResult,
    },
    DuelAbandoned {
        duel_id: DuelId,
    },
}

/// What a successful choice submission led to.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RoundOutcome {
    /// Choice recorded; the opponent has not chosen yet.
    AwaitingOpponent,
    RoundResolved {
        log: BattleLog,
        health: [ParticipantHealth; 2],
    },
    DuelFinished {
        log: BattleLog,
        settlement: SettlementResult,
    },
}

/// What the expiry scan did to one stale duel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Expiry {
    /// One participant had chosen; the silent one forfeited.
    TimedOut { settlement: SettlementResult },
    /// Nobody had chosen; removed without settlement.
    Abandoned { duel_id: DuelId },
}

struct Live {
    duel: Duel,
    replay: ReplayRecorder,
}

struct DuelSlot {
    participants: [PlayerId; 2],
    resolving: AtomicBool,
    live: Mutex<Live>,
}

impl DuelSlot {
    fn lock(&self) -> std::sync::MutexGuard<'_, Live> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Default)]
struct Registry {
    duels: HashMap<DuelId, Arc<DuelSlot>>,
    by_participant: HashMap<PlayerId, DuelId>,
}

/// Manages every active duel.
///
/// Lock order is duel lock, then registry lock, then player locks. The
/// registry lock is never held while waiting on a duel lock.
pub struct DuelEngine {
    catalog: Arc<MoveCatalog>,
    directory: Arc<PlayerDirectory>,
    registry: Mutex<Registry>,
    seeder: Mutex<StdRng>,
    broadcast_tx: broadcast::Sender<String>,
    replays: ReplayStore,
}

impl DuelEngine {
    /// `seed` makes every duel's randomness reproducible; `None` seeds from
    /// OS entropy.
    pub fn new(
        catalog: Arc<MoveCatalog>,
        directory: Arc<PlayerDirectory>,
        seed: Option<u64>,
        replay_capacity: usize,
    ) -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let seeder = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            catalog,
            directory,
            registry: Mutex::new(Registry::default()),
            seeder: Mutex::new(seeder),
            broadcast_tx: tx,
            replays: ReplayStore::new(replay_capacity),
        }
    }

    pub fn directory(&self) -> &Arc<PlayerDirectory> {
        &self.directory
    }

    /// Subscribe to duel events. Returns a receiver that yields JSON strings.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.broadcast_tx.subscribe()
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, duel_id: &DuelId) -> Result<Arc<DuelSlot>, DuelError> {
        self.registry()
            .duels
            .get(duel_id)
            .cloned()
            .ok_or(DuelError::DuelNotFound)
    }

    fn emit(&self, event: &DuelEvent, replay: Option<&mut ReplayRecorder>) {
        match serde_json::to_string(event) {
            Ok(json) => {
                // No subscribers is not an error.
                let _ = self.broadcast_tx.send(json);
            }
            Err(e) => tracing::error!("Failed to serialize duel event: {e}"),
        }
        if let Some(recorder) = replay {
            recorder.record(event);
        }
    }

    /// Start a duel between two players.
    pub fn create_duel(
        &self,
        a: PlayerId,
        b: PlayerId,
        ranked: bool,
    ) -> Result<DuelId, DuelError> {
        if a == b {
            return Err(DuelError::InvalidParticipants);
        }
        let rng = {
            let mut seeder = self.seeder.lock().unwrap_or_else(PoisonError::into_inner);
            StdRng::seed_from_u64(seeder.gen())
        };
        let duel = Duel::new(DuelId::generate(a, b), a, b, ranked, rng)?;
        let duel_id = duel.id.clone();

        let started = DuelEvent::DuelStarted {
            duel_id: duel_id.clone(),
            participants: [a, b],
            ranked,
        };
        let mut replay = ReplayRecorder::new();
        replay.record(&started);

        {
            let mut registry = self.registry();
            for player in [a, b] {
                if registry.by_participant.contains_key(&player) {
                    return Err(DuelError::ParticipantBusy(player));
                }
            }
            registry.by_participant.insert(a, duel_id.clone());
            registry.by_participant.insert(b, duel_id.clone());
            registry.duels.insert(
                duel_id.clone(),
                Arc::new(DuelSlot {
                    participants: [a, b],
                    resolving: AtomicBool::new(false),
                    live: Mutex::new(Live { duel, replay }),
                }),
            );
            metrics::ACTIVE_DUELS.set(registry.duels.len() as i64);
        }

        let mode = if ranked { "ranked" } else { "casual" };
        metrics::DUELS_STARTED_TOTAL.with_label_values(&[mode]).inc();
        tracing::info!(duel_id = %duel_id, a, b, ranked, "Duel started");
        self.emit(&started, None);
        Ok(duel_id)
    }

    /// Record a participant's move for the current round, resolving the round
    /// once both participants have chosen.
    pub fn submit_choice(
        &self,
        duel_id: &DuelId,
        player: PlayerId,
        move_id: &str,
    ) -> Result<RoundOutcome, DuelError> {
        let result = self.try_submit(duel_id, player, move_id);
        if let Err(e) = &result {
            metrics::REJECTED_CHOICES_TOTAL
                .with_label_values(&[e.label()])
                .inc();
            tracing::debug!(duel_id = %duel_id, player, "Choice rejected: {e}");
        }
        result
    }

    fn try_submit(
        &self,
        duel_id: &DuelId,
        player: PlayerId,
        move_id: &str,
    ) -> Result<RoundOutcome, DuelError> {
        let slot = self.slot(duel_id)?;
        if !slot.participants.contains(&player) {
            return Err(DuelError::UnknownParticipant(player));
        }
        if !self.is_available(player, move_id) {
            return Err(DuelError::InvalidMove(move_id.to_string()));
        }
        if slot.resolving.load(Ordering::Acquire) {
            return Err(DuelError::ChoiceAlreadyResolving);
        }

        let mut guard = slot.lock();
        let live = &mut *guard;
        let ready = live.duel.record_choice(player, move_id)?;
        let round = live.duel.round;
        self.emit(
            &DuelEvent::ChoiceSubmitted {
                duel_id: duel_id.clone(),
                player_id: player,
                round,
            },
            None,
        );
        if !ready {
            return Ok(RoundOutcome::AwaitingOpponent);
        }

        slot.resolving.store(true, Ordering::Release);
        let timer = metrics::ROUND_RESOLUTION_SECONDS.start_timer();
        let outcome = self.resolve_locked(live);
        timer.observe_duration();
        slot.resolving.store(false, Ordering::Release);
        outcome
    }

    /// Resolve the round of a duel whose lock is held and whose state is
    /// `Resolving`.
    fn resolve_locked(&self, live: &mut Live) -> Result<RoundOutcome, DuelError> {
        let resolution = match live.duel.resolve(&self.catalog) {
            Ok(r) => r,
            Err(e) => {
                live.duel.pending = [None, None];
                live.duel.state = DuelState::AwaitingChoices;
                return Err(e);
            }
        };
        metrics::ROUNDS_RESOLVED_TOTAL.inc();

        let duel_id = live.duel.id.clone();
        let log = resolution.log.clone();
        let health = live.duel.snapshot().health;
        tracing::debug!(duel_id = %duel_id, round = log.round, ?health, "Round resolved");

        if live.duel.state != DuelState::Finished {
            self.emit(
                &DuelEvent::RoundResolved {
                    duel_id,
                    lines: log.lines(),
                    log: log.clone(),
                    health,
                },
                Some(&mut live.replay),
            );
            return Ok(RoundOutcome::RoundResolved { log, health });
        }

        let (seat, tie_break) = pick_winner(
            resolution.health,
            resolution.raw_health,
            live.duel.rng_mut(),
        );
        let finish = Finish {
            duel_id,
            winner: live.duel.participants[seat],
            loser: live.duel.participants[1 - seat],
            ranked: live.duel.ranked,
            reason: FinishReason::Knockout,
            tie_break,
            rounds: live.duel.round,
        };
        let settlement = self.finish_locked(live, finish, Some(log.clone()));
        Ok(RoundOutcome::DuelFinished { log, settlement })
    }

    /// Settle a finished duel and retire it. Runs under the duel lock, so the
    /// duel is settled exactly once.
    fn finish_locked(
        &self,
        live: &mut Live,
        finish: Finish,
        log: Option<BattleLog>,
    ) -> SettlementResult {
        live.duel.state = DuelState::Finished;
        self.retire(&finish.duel_id);

        let settlement = settle(&self.directory, &finish);
        metrics::DUELS_FINISHED_TOTAL
            .with_label_values(&[finish.reason.label()])
            .inc();
        metrics::DUEL_ROUNDS
            .with_label_values(&[finish.reason.label()])
            .observe(f64::from(finish.rounds));
        tracing::info!(
            duel_id = %finish.duel_id,
            winner = finish.winner,
            loser = finish.loser,
            reason = finish.reason.label(),
            rounds = finish.rounds,
            "Duel finished"
        );

        self.emit(
            &DuelEvent::DuelFinished {
                duel_id: finish.duel_id.clone(),
                log,
                settlement: settlement.clone(),
            },
            Some(&mut live.replay),
        );
        let replay = std::mem::take(&mut live.replay);
        match replay.finish() {
            Ok(data) => self.replays.insert(finish.duel_id, data),
            Err(e) => tracing::error!(duel_id = %finish.duel_id, "Failed to compress replay: {e}"),
        }
        settlement
    }

    /// Remove a duel from the registry.
    fn retire(&self, duel_id: &DuelId) {
        let mut registry = self.registry();
        if let Some(slot) = registry.duels.remove(duel_id) {
            for player in slot.participants {
                if registry.by_participant.get(&player) == Some(duel_id) {
                    registry.by_participant.remove(&player);
                }
            }
        }
        metrics::ACTIVE_DUELS.set(registry.duels.len() as i64);
    }

    fn is_available(&self, player: PlayerId, move_id: &str) -> bool {
        let Some(mv) = self.catalog.get(move_id) else {
            return false;
        };
        self.directory
            .unlocked_groups(player)
            .is_some_and(|groups| groups.contains(&mv.group))
    }

    /// The participant concedes; the opponent wins.
    pub fn forfeit(
        &self,
        duel_id: &DuelId,
        player: PlayerId,
    ) -> Result<SettlementResult, DuelError> {
        let slot = self.slot(duel_id)?;
        if !slot.participants.contains(&player) {
            return Err(DuelError::UnknownParticipant(player));
        }
        let mut guard = slot.lock();
        if guard.duel.state == DuelState::Finished {
            return Err(DuelError::DuelNotFound);
        }
        tracing::warn!(duel_id = %duel_id, player, "Participant forfeited");
        let finish = forfeit_finish(&guard.duel, player, FinishReason::Forfeit);
        Ok(self.finish_locked(&mut guard, finish, None))
    }

    /// Current state of a duel.
    pub fn duel_state(&self, duel_id: &DuelId) -> Result<DuelSnapshot, DuelError> {
        let slot = self.slot(duel_id)?;
        let guard = slot.lock();
        if guard.duel.state == DuelState::Finished {
            return Err(DuelError::DuelNotFound);
        }
        Ok(guard.duel.snapshot())
    }

    /// Moves the player may use, in catalog order. Empty for unknown players.
    pub fn list_available_moves(&self, player: PlayerId) -> Vec<Move> {
        self.directory
            .unlocked_groups(player)
            .map(|groups| self.catalog.available(&groups))
            .unwrap_or_default()
    }

    pub fn active_duel_for(&self, player: PlayerId) -> Option<DuelId> {
        self.registry().by_participant.get(&player).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.registry().duels.len()
    }

    /// Compressed replay of a finished duel.
    pub fn replay(&self, duel_id: &DuelId) -> Option<Vec<u8>> {
        self.replays.get(duel_id)
    }

    /// Finish every duel whose current round has been open longer than
    /// `timeout` as of `now`.
    pub fn expire_stale(&self, now: Instant, timeout: Duration) -> Vec<Expiry> {
        let slots: Vec<Arc<DuelSlot>> = self.registry().duels.values().cloned().collect();
        let mut expired = Vec::new();

        for slot in slots {
            let mut guard = slot.lock();
            let duel = &guard.duel;
            if duel.state != DuelState::AwaitingChoices
                || now.saturating_duration_since(duel.round_started_at) <= timeout
            {
                continue;
            }

            match duel.waiting_on().as_slice() {
                [silent] => {
                    let silent = *silent;
                    tracing::warn!(duel_id = %duel.id, player = silent, "Round timed out");
                    let finish = forfeit_finish(duel, silent, FinishReason::Timeout);
                    let settlement = self.finish_locked(&mut guard, finish, None);
                    expired.push(Expiry::TimedOut { settlement });
                }
                _ => {
                    let duel_id = duel.id.clone();
                    tracing::warn!(duel_id = %duel_id, "Duel abandoned, nobody played");
                    guard.duel.state = DuelState::Finished;
                    self.retire(&duel_id);
                    metrics::DUELS_ABANDONED_TOTAL.inc();
                    self.emit(
                        &DuelEvent::DuelAbandoned {
                            duel_id: duel_id.clone(),
                        },
                        None,
                    );
                    expired.push(Expiry::Abandoned { duel_id });
                }
            }
        }
        expired
    }
}

fn forfeit_finish(duel: &Duel, loser: PlayerId, reason: FinishReason) -> Finish {
    let winner = if duel.participants[0] == loser {
        duel.participants[1]
    } else {
        duel.participants[0]
    };
    Finish {
        duel_id: duel.id.clone(),
        winner,
        loser,
        ranked: duel.ranked,
        reason,
        tie_break: None,
        rounds: duel.round,
    }
}

/// Spawn a background task that periodically expires stale duels.
pub fn spawn_expiry_worker(
    engine: Arc<DuelEngine>,
    timeout: Duration,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let expired = engine.expire_stale(Instant::now(), timeout);
            if !expired.is_empty() {
                tracing::info!("Expired {} stale duel(s)", expired.len());
            }
        }
    })
}
