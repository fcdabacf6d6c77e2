// Move ("sticker") definitions and the read-only move catalog.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::config::MAX_MOVE_MAGNITUDE;

/// What a move does when it is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveKind {
    Attack,
    Defense,
    Heal,
    DamageOverTime,
    Curse,
}

/// Unlock tier gating which moves a player may select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveGroup {
    Basic,
    Advanced,
    Elite,
}

impl MoveGroup {
    /// Shop price in gold. Basic is owned from the start.
    pub fn price(self) -> i64 {
        match self {
            MoveGroup::Basic => 0,
            MoveGroup::Advanced => 300,
            MoveGroup::Elite => 800,
        }
    }

    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "basic" => Some(Self::Basic),
            "advanced" => Some(Self::Advanced),
            "elite" => Some(Self::Elite),
            _ => None,
        }
    }
}

impl std::fmt::Display for MoveGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MoveGroup::Basic => write!(f, "basic"),
            MoveGroup::Advanced => write!(f, "advanced"),
            MoveGroup::Elite => write!(f, "elite"),
        }
    }
}

/// A catalog-defined action a player may select in a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Move {
    pub id: String,
    pub name: String,
    pub kind: MoveKind,
    pub power: i32,
    /// Only meaningful for attacks.
    #[serde(default)]
    pub miss_chance: f64,
    /// Damage reflected at an attacker whose hit this defense blocked.
    #[serde(default)]
    pub counter_damage: Option<i32>,
    /// Rounds a lingering effect lasts (damage over time and curses).
    #[serde(default)]
    pub duration: u32,
    pub group: MoveGroup,
}

impl Move {
    pub fn attack(id: &str, power: i32, miss_chance: f64) -> Self {
        Self::base(id, MoveKind::Attack, power).with_miss_chance(miss_chance)
    }

    pub fn defense(id: &str, power: i32, counter_damage: Option<i32>) -> Self {
        Self {
            counter_damage,
            ..Self::base(id, MoveKind::Defense, power)
        }
    }

    pub fn heal(id: &str, power: i32) -> Self {
        Self::base(id, MoveKind::Heal, power)
    }

    pub fn damage_over_time(id: &str, power: i32, duration: u32) -> Self {
        Self {
            duration,
            ..Self::base(id, MoveKind::DamageOverTime, power)
        }
    }

    pub fn curse(id: &str, power: i32, duration: u32) -> Self {
        Self {
            duration,
            ..Self::base(id, MoveKind::Curse, power)
        }
    }

    fn base(id: &str, kind: MoveKind, power: i32) -> Self {
        Self {
            id: id.to_string(),
            name: id.replace('_', " "),
            kind,
            power,
            miss_chance: 0.0,
            counter_damage: None,
            duration: 0,
            group: MoveGroup::Basic,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn in_group(mut self, group: MoveGroup) -> Self {
        self.group = group;
        self
    }

    fn with_miss_chance(mut self, miss_chance: f64) -> Self {
        self.miss_chance = miss_chance;
        self
    }
}

/// Problems found while building a catalog.
#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("duplicate move id '{0}'")]
    DuplicateId(String),
    #[error("move '{0}' has negative power")]
    NegativePower(String),
    #[error("move '{0}' has a miss chance outside [0, 1]")]
    InvalidMissChance(String),
    #[error("move '{0}' has negative counter damage")]
    NegativeCounter(String),
    #[error("move '{0}' exceeds the magnitude limit of {MAX_MOVE_MAGNITUDE}")]
    MagnitudeTooLarge(String),
    #[error("failed to read catalog: {0}")]
    Io(String),
    #[error("failed to parse catalog: {0}")]
    Parse(String),
}

/// Read-only table of all moves, in canonical display order.
#[derive(Debug, Clone)]
pub struct MoveCatalog {
    moves: Vec<Move>,
}

impl MoveCatalog {
    pub fn new(moves: Vec<Move>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for m in &moves {
            if !seen.insert(m.id.as_str()) {
                return Err(CatalogError::DuplicateId(m.id.clone()));
            }
            if m.power < 0 {
                return Err(CatalogError::NegativePower(m.id.clone()));
            }
            if !(0.0..=1.0).contains(&m.miss_chance) {
                return Err(CatalogError::InvalidMissChance(m.id.clone()));
            }
            if m.counter_damage.is_some_and(|c| c < 0) {
                return Err(CatalogError::NegativeCounter(m.id.clone()));
            }
            if m.power > MAX_MOVE_MAGNITUDE
                || m.counter_damage.is_some_and(|c| c > MAX_MOVE_MAGNITUDE)
            {
                return Err(CatalogError::MagnitudeTooLarge(m.id.clone()));
            }
        }
        Ok(Self { moves })
    }

    /// Parse a JSON array of moves.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let moves: Vec<Move> =
            serde_json::from_str(json).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Self::new(moves)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::Io(format!("{}: {e}", path.display())))?;
        Self::from_json(&contents)
    }

    /// The built-in sticker set.
    pub fn standard() -> Self {
        let moves = vec![
            Move::attack("slash", 3, 0.1).named("Slash"),
            Move::attack("jab", 2, 0.0).named("Jab"),
            Move::defense("shield", 2, Some(1)).named("Shield"),
            Move::heal("bandage", 2).named("Bandage"),
            Move::attack("heavy_blow", 5, 0.35)
                .named("Heavy Blow")
                .in_group(MoveGroup::Advanced),
            Move::defense("spiked_guard", 3, Some(2))
                .named("Spiked Guard")
                .in_group(MoveGroup::Advanced),
            Move::heal("second_wind", 4)
                .named("Second Wind")
                .in_group(MoveGroup::Advanced),
            Move::attack("fireball", 6, 0.4)
                .named("Fireball")
                .in_group(MoveGroup::Elite),
            Move::damage_over_time("poison_dart", 1, 3)
                .named("Poison Dart")
                .in_group(MoveGroup::Elite),
            Move::curse("hex", 2, 2).named("Hex").in_group(MoveGroup::Elite),
        ];
        Self { moves }
    }

    pub fn get(&self, id: &str) -> Option<&Move> {
        self.moves.iter().find(|m| m.id == id)
    }

    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    /// Moves selectable with the given unlocked groups, in catalog order.
    pub fn available<'g, I>(&self, groups: I) -> Vec<Move>
    where
        I: IntoIterator<Item = &'g MoveGroup>,
    {
        let groups: HashSet<MoveGroup> = groups.into_iter().copied().collect();
        self.moves
            .iter()
            .filter(|m| groups.contains(&m.group))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }
}
