// Post-duel settlement: winner selection and reward distribution.

use rand::Rng;
use serde::Serialize;

use super::config::{LOSER_EXP, WINNER_CURRENCY, WINNER_EXP};
use super::duel::DuelId;
use crate::players::{PlayerDirectory, PlayerId};
use crate::rating::{calculate_new_rating, Outcome};

/// Why a duel ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Knockout,
    Forfeit,
    Timeout,
}

impl FinishReason {
    pub fn label(self) -> &'static str {
        match self {
            FinishReason::Knockout => "knockout",
            FinishReason::Forfeit => "forfeit",
            FinishReason::Timeout => "timeout",
        }
    }
}

/// Rule used when both participants were knocked out in the same round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// The participant whose unclamped HP ended higher wins.
    LessOverkill,
    /// Unclamped HP was equal; decided by the duel's RNG.
    CoinFlip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WinnerLoser<T> {
    pub winner: T,
    pub loser: T,
}

/// Everything the presentation layer needs to announce the end of a duel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementResult {
    pub duel_id: DuelId,
    pub winner_id: PlayerId,
    pub loser_id: PlayerId,
    pub reason: FinishReason,
    pub tie_break: Option<TieBreak>,
    pub ranked: bool,
    pub rounds: u32,
    pub exp_gained: WinnerLoser<i64>,
    pub currency_gained: i64,
    pub rating_delta: WinnerLoser<i32>,
    pub leveled_up: WinnerLoser<bool>,
}

/// Pick the winning seat of a finished duel.
///
/// A lone survivor wins outright. On a double knockout the seat with the
/// higher unclamped HP wins; an exact tie is a coin flip.
pub fn pick_winner<R: Rng + ?Sized>(
    health: [i32; 2],
    raw_health: [i32; 2],
    rng: &mut R,
) -> (usize, Option<TieBreak>) {
    match (health[0] > 0, health[1] > 0) {
        (true, false) => (0, None),
        (false, true) => (1, None),
        _ => match raw_health[0].cmp(&raw_health[1]) {
            std::cmp::Ordering::Greater => (0, Some(TieBreak::LessOverkill)),
            std::cmp::Ordering::Less => (1, Some(TieBreak::LessOverkill)),
            std::cmp::Ordering::Equal => {
                let seat = if rng.gen_bool(0.5) { 0 } else { 1 };
                (seat, Some(TieBreak::CoinFlip))
            }
        },
    }
}

/// Inputs for one settlement.
#[derive(Debug, Clone)]
pub struct Finish {
    pub duel_id: DuelId,
    pub winner: PlayerId,
    pub loser: PlayerId,
    pub ranked: bool,
    pub reason: FinishReason,
    pub tie_break: Option<TieBreak>,
    pub rounds: u32,
}

struct Applied {
    rating_delta: i32,
    leveled_up: bool,
}

fn apply(
    directory: &PlayerDirectory,
    player: PlayerId,
    outcome: Outcome,
    ranked: bool,
) -> Applied {
    let applied = directory.update(player, |p| {
        let rating_before = p.rating;
        let exp = match outcome {
            Outcome::Win => {
                p.wins += 1;
                p.currency += WINNER_CURRENCY;
                WINNER_EXP
            }
            Outcome::Loss => {
                p.losses += 1;
                LOSER_EXP
            }
        };
        if ranked {
            p.rating = calculate_new_rating(p.rating, outcome);
        }
        let leveled_up = p.add_experience(exp);
        if leveled_up {
            tracing::info!(player_id = p.id, level = p.level, "Player leveled up");
        }
        Applied {
            rating_delta: p.rating - rating_before,
            leveled_up,
        }
    });

    applied.unwrap_or_else(|| {
        tracing::warn!(player_id = player, "Settlement skipped for unknown player");
        Applied {
            rating_delta: 0,
            leveled_up: false,
        }
    })
}

/// Apply rewards to both players and build the result.
/// Callers must guarantee this runs once per duel.
pub fn settle(directory: &PlayerDirectory, finish: &Finish) -> SettlementResult {
    let winner = apply(directory, finish.winner, Outcome::Win, finish.ranked);
    let loser = apply(directory, finish.loser, Outcome::Loss, finish.ranked);

    SettlementResult {
        duel_id: finish.duel_id.clone(),
        winner_id: finish.winner,
        loser_id: finish.loser,
        reason: finish.reason,
        tie_break: finish.tie_break,
        ranked: finish.ranked,
        rounds: finish.rounds,
        exp_gained: WinnerLoser {
            winner: WINNER_EXP,
            loser: LOSER_EXP,
        },
        currency_gained: WINNER_CURRENCY,
        rating_delta: WinnerLoser {
            winner: winner.rating_delta,
            loser: loser.rating_delta,
        },
        leveled_up: WinnerLoser {
            winner: winner.leveled_up,
            loser: loser.leveled_up,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rating::{RATING_FLOOR, STARTING_RATING};
    use rand::rngs::mock::StepRng;

    fn finish(ranked: bool) -> Finish {
        Finish {
            duel_id: DuelId::from("duel-1-2-test"),
            winner: 1,
            loser: 2,
            ranked,
            reason: FinishReason::Knockout,
            tie_break: None,
            rounds: 4,
        }
    }

    fn directory() -> PlayerDirectory {
        let dir = PlayerDirectory::new();
        dir.get_or_create(1, "winner");
        dir.get_or_create(2, "loser");
        dir
    }

    #[test]
    fn test_lone_survivor_wins() {
        let mut rng = StepRng::new(0, 0);
        assert_eq!(pick_winner([3, 0], [3, -1], &mut rng), (0, None));
        assert_eq!(pick_winner([0, 1], [-5, 1], &mut rng), (1, None));
    }

    #[test]
    fn test_double_knockout_less_overkill_wins() {
        let mut rng = StepRng::new(0, 0);
        assert_eq!(
            pick_winner([0, 0], [-1, -4], &mut rng),
            (0, Some(TieBreak::LessOverkill))
        );
        assert_eq!(
            pick_winner([0, 0], [-3, 0], &mut rng),
            (1, Some(TieBreak::LessOverkill))
        );
    }

    #[test]
    fn test_exact_tie_is_coin_flip() {
        // gen_bool(0.5) is true for low draws and false for high ones.
        let (low_seat, rule) = pick_winner([0, 0], [-2, -2], &mut StepRng::new(0, 0));
        assert_eq!(rule, Some(TieBreak::CoinFlip));
        let (high_seat, _) = pick_winner([0, 0], [-2, -2], &mut StepRng::new(u64::MAX, 0));
        assert_ne!(low_seat, high_seat);
    }

    #[test]
    fn test_unranked_settlement() {
        let dir = directory();
        let result = settle(&dir, &finish(false));

        let winner = dir.get(1).unwrap();
        let loser = dir.get(2).unwrap();
        assert_eq!(winner.wins, 1);
        assert_eq!(loser.losses, 1);
        assert_eq!(winner.experience, 25);
        assert_eq!(loser.experience, 12);
        assert_eq!(winner.currency, 1015);
        assert_eq!(loser.currency, 1000);
        assert_eq!(winner.rating, STARTING_RATING);
        assert_eq!(loser.rating, STARTING_RATING);

        assert_eq!(result.rating_delta, WinnerLoser { winner: 0, loser: 0 });
        assert_eq!(result.exp_gained, WinnerLoser { winner: 25, loser: 12 });
        assert_eq!(result.currency_gained, 15);
        assert_eq!(result.rounds, 4);
    }

    #[test]
    fn test_ranked_settlement() {
        let dir = directory();
        let result = settle(&dir, &finish(true));
        assert_eq!(dir.get(1).unwrap().rating, STARTING_RATING + 25);
        assert_eq!(dir.get(2).unwrap().rating, STARTING_RATING - 12);
        assert_eq!(
            result.rating_delta,
            WinnerLoser {
                winner: 25,
                loser: -12
            }
        );
    }

    #[test]
    fn test_ranked_loss_respects_floor() {
        let dir = directory();
        dir.update(2, |p| p.rating = RATING_FLOOR + 5);
        let result = settle(&dir, &finish(true));
        assert_eq!(dir.get(2).unwrap().rating, RATING_FLOOR);
        assert_eq!(result.rating_delta.loser, -5);
    }

    #[test]
    fn test_settlement_reports_level_up() {
        let dir = directory();
        dir.update(1, |p| p.experience = 90);
        let result = settle(&dir, &finish(false));
        assert!(result.leveled_up.winner);
        assert!(!result.leveled_up.loser);
        let winner = dir.get(1).unwrap();
        assert_eq!(winner.level, 2);
        assert_eq!(winner.experience, 15);
    }

    #[test]
    fn test_missing_player_is_skipped() {
        let dir = PlayerDirectory::new();
        dir.get_or_create(1, "only one");
        let result = settle(&dir, &finish(true));
        assert_eq!(result.rating_delta.winner, 25);
        assert_eq!(result.rating_delta.loser, 0);
        assert_eq!(dir.get(1).unwrap().wins, 1);
    }
}
