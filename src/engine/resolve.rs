// Effect resolution: turns two simultaneous move choices into health changes
// and an ordered battle log.
//
// Both sides are evaluated against the pre-round snapshot, so the outcome does
// not depend on which participant is processed first. The only randomness is
// the per-attack miss roll, drawn from the injected RNG in seat order.

use rand::Rng;
use serde::Serialize;

use super::config::MAX_HEALTH;
use super::moves::{Move, MoveKind};
use crate::players::PlayerId;

/// A lingering effect carried by a participant between rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    /// Deals `magnitude` damage at the start of each remaining round.
    Poison,
    /// Reduces the bearer's attack power by `magnitude`.
    Weakness,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LingeringEffect {
    pub kind: EffectKind,
    pub magnitude: i32,
    pub rounds_left: u32,
    pub source_move: String,
}

/// HP of one participant after a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParticipantHealth {
    pub player: PlayerId,
    pub health: i32,
}

/// One entry of the battle log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BattleEvent {
    Attack {
        actor: PlayerId,
        target: PlayerId,
        move_id: String,
        power: i32,
    },
    Miss {
        actor: PlayerId,
    },
    Hit {
        target: PlayerId,
        damage: i32,
    },
    Blocked {
        defender: PlayerId,
        blocked: i32,
        through: i32,
    },
    Counter {
        actor: PlayerId,
        target: PlayerId,
        damage: i32,
    },
    Guard {
        actor: PlayerId,
        power: i32,
    },
    Heal {
        actor: PlayerId,
        amount: i32,
    },
    Afflict {
        actor: PlayerId,
        target: PlayerId,
        damage_per_round: i32,
        rounds: u32,
    },
    Curse {
        actor: PlayerId,
        target: PlayerId,
        weakness: i32,
        rounds: u32,
    },
    PoisonTick {
        target: PlayerId,
        damage: i32,
    },
    Health {
        participants: [ParticipantHealth; 2],
    },
}

impl std::fmt::Display for BattleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BattleEvent::Attack {
                actor,
                target,
                move_id,
                power,
            } => write!(f, "{actor} attacks {target} with {move_id} for {power}"),
            BattleEvent::Miss { actor } => write!(f, "{actor} misses"),
            BattleEvent::Hit { target, damage } => write!(f, "{target} takes {damage} damage"),
            BattleEvent::Blocked {
                defender,
                blocked,
                through,
            } => write!(f, "blocked {blocked} by {defender}, {through} damage through"),
            BattleEvent::Counter { actor, damage, .. } => {
                write!(f, "{actor} counters for {damage}")
            }
            BattleEvent::Guard { actor, power } => write!(f, "{actor} guards for {power}"),
            BattleEvent::Heal { actor, amount } => write!(f, "{actor} heals {amount}"),
            BattleEvent::Afflict {
                actor,
                target,
                damage_per_round,
                rounds,
            } => write!(
                f,
                "{actor} poisons {target} for {damage_per_round} over {rounds} rounds"
            ),
            BattleEvent::Curse {
                actor,
                target,
                weakness,
                rounds,
            } => write!(
                f,
                "{actor} curses {target}: -{weakness} attack for {rounds} rounds"
            ),
            BattleEvent::PoisonTick { target, damage } => {
                write!(f, "{target} suffers {damage} poison damage")
            }
            BattleEvent::Health { participants } => write!(
                f,
                "HP {}: {}, {}: {}",
                participants[0].player,
                participants[0].health,
                participants[1].player,
                participants[1].health
            ),
        }
    }
}

/// Ordered events of one resolved round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BattleLog {
    pub round: u32,
    pub events: Vec<BattleEvent>,
}

impl BattleLog {
    /// Human-readable rendering, one line per event.
    pub fn lines(&self) -> Vec<String> {
        self.events.iter().map(ToString::to_string).collect()
    }
}

/// Pre-round snapshot of one participant.
#[derive(Debug, Clone, Copy)]
pub struct Side<'a> {
    pub player: PlayerId,
    pub health: i32,
    pub choice: &'a Move,
    pub effects: &'a [LingeringEffect],
}

/// Result of resolving one round.
#[derive(Debug, Clone)]
pub struct RoundResolution {
    pub log: BattleLog,
    /// Clamped to `[0, MAX_HEALTH]`.
    pub health: [i32; 2],
    /// Before clamping; used to break double-knockout ties.
    pub raw_health: [i32; 2],
    /// Effects carried into the next round.
    pub effects: [Vec<LingeringEffect>; 2],
}

fn weakness_of(effects: &[LingeringEffect]) -> i32 {
    effects
        .iter()
        .filter(|e| e.kind == EffectKind::Weakness)
        .map(|e| e.magnitude)
        .sum()
}

/// Resolve both choices of a round simultaneously.
pub fn resolve_round<R: Rng + ?Sized>(
    round: u32,
    sides: [Side<'_>; 2],
    rng: &mut R,
) -> RoundResolution {
    let mut damage = [0i32; 2];
    let mut healed = [0i32; 2];
    let mut afflictions: [Vec<LingeringEffect>; 2] = [Vec::new(), Vec::new()];
    let mut events = Vec::new();

    for (p, o) in [(0usize, 1usize), (1, 0)] {
        let me = &sides[p];
        let foe = &sides[o];
        let chosen = me.choice;

        match chosen.kind {
            MoveKind::Attack => {
                let roll: f64 = rng.gen();
                let power = (chosen.power - weakness_of(me.effects)).max(0);
                events.push(BattleEvent::Attack {
                    actor: me.player,
                    target: foe.player,
                    move_id: chosen.id.clone(),
                    power,
                });

                if roll < chosen.miss_chance {
                    events.push(BattleEvent::Miss { actor: me.player });
                } else if foe.choice.kind == MoveKind::Defense {
                    let blocked = power.min(foe.choice.power);
                    let through = power - blocked;
                    damage[o] += through;
                    events.push(BattleEvent::Blocked {
                        defender: foe.player,
                        blocked,
                        through,
                    });
                    // Counters ignore the attacker's own defense.
                    if let Some(counter) = foe.choice.counter_damage {
                        damage[p] += counter;
                        events.push(BattleEvent::Counter {
                            actor: foe.player,
                            target: me.player,
                            damage: counter,
                        });
                    }
                } else {
                    damage[o] += power;
                    events.push(BattleEvent::Hit {
                        target: foe.player,
                        damage: power,
                    });
                }
            }
            MoveKind::Defense => {
                events.push(BattleEvent::Guard {
                    actor: me.player,
                    power: chosen.power,
                });
            }
            MoveKind::Heal => {
                let amount = chosen.power.min(MAX_HEALTH - me.health).max(0);
                healed[p] += amount;
                events.push(BattleEvent::Heal {
                    actor: me.player,
                    amount,
                });
            }
            MoveKind::DamageOverTime => {
                if chosen.duration > 0 {
                    afflictions[o].push(LingeringEffect {
                        kind: EffectKind::Poison,
                        magnitude: chosen.power,
                        rounds_left: chosen.duration,
                        source_move: chosen.id.clone(),
                    });
                }
                events.push(BattleEvent::Afflict {
                    actor: me.player,
                    target: foe.player,
                    damage_per_round: chosen.power,
                    rounds: chosen.duration,
                });
            }
            MoveKind::Curse => {
                if chosen.duration > 0 {
                    afflictions[o].push(LingeringEffect {
                        kind: EffectKind::Weakness,
                        magnitude: chosen.power,
                        rounds_left: chosen.duration,
                        source_move: chosen.id.clone(),
                    });
                }
                events.push(BattleEvent::Curse {
                    actor: me.player,
                    target: foe.player,
                    weakness: chosen.power,
                    rounds: chosen.duration,
                });
            }
        }
    }

    for (i, side) in sides.iter().enumerate() {
        for effect in side.effects.iter().filter(|e| e.kind == EffectKind::Poison) {
            damage[i] += effect.magnitude;
            events.push(BattleEvent::PoisonTick {
                target: side.player,
                damage: effect.magnitude,
            });
        }
    }

    let raw_health = [
        sides[0].health + healed[0] - damage[0],
        sides[1].health + healed[1] - damage[1],
    ];
    let health = raw_health.map(|hp| hp.clamp(0, MAX_HEALTH));

    events.push(BattleEvent::Health {
        participants: [
            ParticipantHealth {
                player: sides[0].player,
                health: health[0],
            },
            ParticipantHealth {
                player: sides[1].player,
                health: health[1],
            },
        ],
    });

    let [new_first, new_second] = afflictions;
    let effects = [
        carry_over(sides[0].effects, new_first),
        carry_over(sides[1].effects, new_second),
    ];

    RoundResolution {
        log: BattleLog { round, events },
        health,
        raw_health,
        effects,
    }
}

/// Age existing effects by one round and append the newly applied ones.
fn carry_over(existing: &[LingeringEffect], fresh: Vec<LingeringEffect>) -> Vec<LingeringEffect> {
    existing
        .iter()
        .filter(|e| e.rounds_left > 1)
        .map(|e| LingeringEffect {
            rounds_left: e.rounds_left - 1,
            ..e.clone()
        })
        .chain(fresh)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    const X: PlayerId = 1;
    const Y: PlayerId = 2;

    /// Every draw is 0.0: any attack with a non-zero miss chance misses.
    fn always_low() -> StepRng {
        StepRng::new(0, 0)
    }

    /// Every draw is just below 1.0: only a miss chance of 1.0 misses.
    fn always_high() -> StepRng {
        StepRng::new(u64::MAX, 0)
    }

    fn side<'a>(player: PlayerId, health: i32, choice: &'a Move) -> Side<'a> {
        Side {
            player,
            health,
            choice,
            effects: &[],
        }
    }

    #[test]
    fn test_double_attack_both_land() {
        let a = Move::attack("a", 3, 0.0);
        let b = Move::attack("b", 4, 0.0);
        let r = resolve_round(1, [side(X, 10, &a), side(Y, 10, &b)], &mut always_low());
        assert_eq!(r.health, [6, 7]);

        let r = resolve_round(1, [side(X, 2, &a), side(Y, 3, &b)], &mut always_low());
        assert_eq!(r.health, [0, 0]);
        assert_eq!(r.raw_health, [-2, 0]);
    }

    #[test]
    fn test_block_and_counter() {
        let attack = Move::attack("strike", 3, 0.0);
        let defense = Move::defense("shield", 2, Some(1));
        let r = resolve_round(
            1,
            [side(X, 10, &attack), side(Y, 10, &defense)],
            &mut always_low(),
        );
        assert_eq!(r.health, [9, 9]);
        assert_eq!(
            r.log.events,
            vec![
                BattleEvent::Attack {
                    actor: X,
                    target: Y,
                    move_id: "strike".into(),
                    power: 3,
                },
                BattleEvent::Blocked {
                    defender: Y,
                    blocked: 2,
                    through: 1,
                },
                BattleEvent::Counter {
                    actor: Y,
                    target: X,
                    damage: 1,
                },
                BattleEvent::Guard { actor: Y, power: 2 },
                BattleEvent::Health {
                    participants: [
                        ParticipantHealth {
                            player: X,
                            health: 9
                        },
                        ParticipantHealth {
                            player: Y,
                            health: 9
                        },
                    ],
                },
            ]
        );
    }

    #[test]
    fn test_defense_stronger_than_attack_blocks_everything() {
        let attack = Move::attack("poke", 1, 0.0);
        let defense = Move::defense("wall", 5, None);
        let r = resolve_round(
            1,
            [side(X, 10, &defense), side(Y, 10, &attack)],
            &mut always_low(),
        );
        assert_eq!(r.health, [10, 10]);
    }

    #[test]
    fn test_counter_bypasses_attackers_defense() {
        // Nothing gets through, but the counter lands in full.
        let attack = Move::attack("strike", 2, 0.0);
        let spiked = Move::defense("spikes", 2, Some(3));
        let r = resolve_round(
            1,
            [side(X, 10, &attack), side(Y, 10, &spiked)],
            &mut always_low(),
        );
        assert_eq!(r.health, [7, 10]);
    }

    #[test]
    fn test_heal_clamps_at_max() {
        let heal = Move::heal("potion", 5);
        let guard = Move::defense("guard", 1, None);
        let r = resolve_round(1, [side(X, 8, &heal), side(Y, 10, &guard)], &mut always_low());
        assert_eq!(r.health[0], 10);
        assert!(r
            .log
            .events
            .contains(&BattleEvent::Heal { actor: X, amount: 2 }));
    }

    #[test]
    fn test_heal_and_attack_use_pre_round_snapshot() {
        let heal = Move::heal("bandage", 2);
        let attack = Move::attack("strike", 3, 0.0);
        let r = resolve_round(1, [side(X, 2, &heal), side(Y, 10, &attack)], &mut always_low());
        assert_eq!(r.health, [1, 10]);
    }

    #[test]
    fn test_double_heal_independent() {
        let small = Move::heal("small", 1);
        let big = Move::heal("big", 4);
        let r = resolve_round(1, [side(X, 5, &small), side(Y, 5, &big)], &mut always_low());
        assert_eq!(r.health, [6, 9]);
    }

    #[test]
    fn test_certain_miss_never_connects() {
        let hopeless = Move::attack("hopeless", 9, 1.0);
        let idle = Move::defense("idle", 0, None);
        for mut rng in [always_low(), always_high()] {
            let r = resolve_round(1, [side(X, 10, &hopeless), side(Y, 10, &idle)], &mut rng);
            assert_eq!(r.health, [10, 10]);
            assert!(r.log.events.contains(&BattleEvent::Miss { actor: X }));
        }
    }

    #[test]
    fn test_zero_miss_chance_always_connects() {
        let sure = Move::attack("sure", 2, 0.0);
        let idle = Move::heal("idle", 0);
        for mut rng in [always_low(), always_high()] {
            let r = resolve_round(1, [side(X, 10, &sure), side(Y, 10, &idle)], &mut rng);
            assert_eq!(r.health, [10, 8]);
        }
    }

    #[test]
    fn test_miss_rolls_are_independent() {
        // Draws alternate 0.0, 0.5: the first attack misses, the second lands.
        let mut rng = StepRng::new(0, 1 << 63);
        let shaky = Move::attack("shaky", 3, 0.3);
        let r = resolve_round(1, [side(X, 10, &shaky), side(Y, 10, &shaky)], &mut rng);
        assert_eq!(r.health, [7, 10]);
    }

    #[test]
    fn test_miss_against_defense_triggers_no_counter() {
        let hopeless = Move::attack("hopeless", 3, 1.0);
        let spiked = Move::defense("spikes", 2, Some(2));
        let r = resolve_round(
            1,
            [side(X, 10, &hopeless), side(Y, 10, &spiked)],
            &mut always_low(),
        );
        assert_eq!(r.health, [10, 10]);
    }

    #[test]
    fn test_poison_ticks_from_next_round() {
        let dart = Move::damage_over_time("dart", 1, 2);
        let guard = Move::defense("guard", 1, None);

        let r1 = resolve_round(1, [side(X, 10, &dart), side(Y, 10, &guard)], &mut always_low());
        assert_eq!(r1.health, [10, 10]);
        assert_eq!(r1.effects[1].len(), 1);
        assert_eq!(r1.effects[1][0].rounds_left, 2);

        let r2 = resolve_round(
            2,
            [
                side(X, 10, &guard),
                Side {
                    player: Y,
                    health: 10,
                    choice: &guard,
                    effects: &r1.effects[1],
                },
            ],
            &mut always_low(),
        );
        assert_eq!(r2.health, [10, 9]);
        assert_eq!(r2.effects[1][0].rounds_left, 1);

        let r3 = resolve_round(
            3,
            [
                side(X, 10, &guard),
                Side {
                    player: Y,
                    health: 9,
                    choice: &guard,
                    effects: &r2.effects[1],
                },
            ],
            &mut always_low(),
        );
        assert_eq!(r3.health, [10, 8]);
        assert!(r3.effects[1].is_empty());
    }

    #[test]
    fn test_curse_weakens_attacks() {
        let weakness = [LingeringEffect {
            kind: EffectKind::Weakness,
            magnitude: 2,
            rounds_left: 1,
            source_move: "hex".into(),
        }];
        let strike = Move::attack("strike", 3, 0.0);
        let rest = Move::heal("rest", 0);
        let r = resolve_round(
            2,
            [
                Side {
                    player: X,
                    health: 10,
                    choice: &strike,
                    effects: &weakness,
                },
                side(Y, 10, &rest),
            ],
            &mut always_low(),
        );
        assert_eq!(r.health, [10, 9]);
        assert!(r.effects[0].is_empty());
    }

    #[test]
    fn test_log_lines_render() {
        let attack = Move::attack("strike", 3, 0.0);
        let defense = Move::defense("shield", 2, Some(1));
        let r = resolve_round(
            1,
            [side(X, 10, &attack), side(Y, 10, &defense)],
            &mut always_low(),
        );
        let lines = r.log.lines();
        assert_eq!(lines[0], "1 attacks 2 with strike for 3");
        assert_eq!(lines[1], "blocked 2 by 2, 1 damage through");
        assert_eq!(lines[2], "2 counters for 1");
        assert_eq!(lines.last().unwrap(), "HP 1: 9, 2: 9");
    }
}
