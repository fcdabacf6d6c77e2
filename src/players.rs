// Player Directory: in-memory player records keyed by external identity.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::engine::config::{EXP_PER_LEVEL, STARTING_CURRENCY, STARTING_LEVEL};
use crate::engine::moves::MoveGroup;
use crate::rating::STARTING_RATING;

/// External identity of a player (the chat user id).
pub type PlayerId = i64;

/// Resources, buildings and army of a player's kingdom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Kingdom {
    pub food: i64,
    pub wood: i64,
    pub iron: i64,
    pub farms: u32,
    pub mines: u32,
    pub barracks: u32,
    pub infantry: u32,
    pub archers: u32,
    pub knights: u32,
}

impl Default for Kingdom {
    fn default() -> Self {
        Self {
            food: 500,
            wood: 300,
            iron: 200,
            farms: 1,
            mines: 1,
            barracks: 1,
            infantry: 10,
            archers: 5,
            knights: 2,
        }
    }
}

/// A player record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Player {
    pub id: PlayerId,
    pub display_name: String,
    pub unlocked_groups: BTreeSet<MoveGroup>,
    pub rating: i32,
    pub experience: i64,
    pub level: u32,
    /// Gold.
    pub currency: i64,
    pub wins: u32,
    pub losses: u32,
    pub kingdom: Kingdom,
    pub last_bonus: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

/// Experience required to leave `level`.
pub fn level_threshold(level: u32) -> i64 {
    i64::from(level) * EXP_PER_LEVEL
}

impl Player {
    pub fn new(id: PlayerId, display_name: &str) -> Self {
        Self {
            id,
            display_name: display_name.to_string(),
            unlocked_groups: BTreeSet::from([MoveGroup::Basic]),
            rating: STARTING_RATING,
            experience: 0,
            level: STARTING_LEVEL,
            currency: STARTING_CURRENCY,
            wins: 0,
            losses: 0,
            kingdom: Kingdom::default(),
            last_bonus: None,
            created_at: Utc::now(),
        }
    }

    /// Add experience. Excess over the threshold carries into the next level.
    /// Returns true if at least one level was gained.
    pub fn add_experience(&mut self, amount: i64) -> bool {
        self.experience += amount;
        let mut leveled_up = false;
        while self.experience >= level_threshold(self.level) {
            self.experience -= level_threshold(self.level);
            self.level += 1;
            leveled_up = true;
        }
        leveled_up
    }

    pub fn has_group(&self, group: MoveGroup) -> bool {
        self.unlocked_groups.contains(&group)
    }
}

/// Thread-safe player store. Each record has its own lock so concurrent
/// settlements of different duels only contend on shared players.
#[derive(Debug, Default)]
pub struct PlayerDirectory {
    players: RwLock<HashMap<PlayerId, Arc<Mutex<Player>>>>,
}

impl PlayerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: PlayerId) -> Option<Arc<Mutex<Player>>> {
        self.players
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Look up a player, creating a fresh record on first contact.
    pub fn get_or_create(&self, id: PlayerId, display_name: &str) -> Player {
        if let Some(existing) = self.get(id) {
            return existing;
        }
        let mut players = self.players.write().unwrap_or_else(PoisonError::into_inner);
        let record = players.entry(id).or_insert_with(|| {
            tracing::info!(player_id = id, "Registering new player '{display_name}'");
            Arc::new(Mutex::new(Player::new(id, display_name)))
        });
        let player = record.lock().unwrap_or_else(PoisonError::into_inner).clone();
        player
    }

    pub fn get(&self, id: PlayerId) -> Option<Player> {
        self.entry(id)
            .map(|p| p.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.entry(id).is_some()
    }

    /// Apply `f` to a player under that player's lock.
    /// Returns `None` if the player does not exist.
    pub fn update<R>(&self, id: PlayerId, f: impl FnOnce(&mut Player) -> R) -> Option<R> {
        let record = self.entry(id)?;
        let mut player = record.lock().unwrap_or_else(PoisonError::into_inner);
        Some(f(&mut player))
    }

    pub fn unlocked_groups(&self, id: PlayerId) -> Option<BTreeSet<MoveGroup>> {
        self.update(id, |p| p.unlocked_groups.clone())
    }

    pub fn rating(&self, id: PlayerId) -> Option<i32> {
        self.update(id, |p| p.rating)
    }

    /// Top players by rating, ties broken by wins then id.
    pub fn leaderboard(&self, limit: usize) -> Vec<Player> {
        let records: Vec<Arc<Mutex<Player>>> = self
            .players
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut players: Vec<Player> = records
            .iter()
            .map(|p| p.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .collect();
        players.sort_by(|a, b| {
            b.rating
                .cmp(&a.rating)
                .then(b.wins.cmp(&a.wins))
                .then(a.id.cmp(&b.id))
        });
        players.truncate(limit);
        players
    }

    pub fn len(&self) -> usize {
        self.players
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_player_defaults() {
        let p = Player::new(7, "Arthur");
        assert_eq!(p.level, 1);
        assert_eq!(p.experience, 0);
        assert_eq!(p.rating, STARTING_RATING);
        assert_eq!(p.currency, 1000);
        assert!(p.has_group(MoveGroup::Basic));
        assert!(!p.has_group(MoveGroup::Elite));
        assert_eq!(p.kingdom.farms, 1);
    }

    #[test]
    fn test_add_experience_carries_over() {
        let mut p = Player::new(1, "a");
        assert!(!p.add_experience(90));
        assert!(p.add_experience(25));
        assert_eq!(p.level, 2);
        assert_eq!(p.experience, 15);
    }

    #[test]
    fn test_add_experience_multiple_levels() {
        let mut p = Player::new(1, "a");
        // 100 for level 1, 200 for level 2, 50 left over
        assert!(p.add_experience(350));
        assert_eq!(p.level, 3);
        assert_eq!(p.experience, 50);
    }

    #[test]
    fn test_exact_threshold_levels_up() {
        let mut p = Player::new(1, "a");
        assert!(p.add_experience(100));
        assert_eq!(p.level, 2);
        assert_eq!(p.experience, 0);
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let dir = PlayerDirectory::new();
        assert!(dir.is_empty());
        let first = dir.get_or_create(5, "Merlin");
        dir.update(5, |p| p.wins = 3);
        let second = dir.get_or_create(5, "Someone Else");
        assert_eq!(first.display_name, "Merlin");
        assert_eq!(second.display_name, "Merlin");
        assert_eq!(second.wins, 3);
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_update_missing_player() {
        let dir = PlayerDirectory::new();
        assert!(dir.update(99, |p| p.wins += 1).is_none());
        assert!(dir.get(99).is_none());
        assert!(!dir.contains(99));
    }

    #[test]
    fn test_leaderboard_order() {
        let dir = PlayerDirectory::new();
        for (id, rating, wins) in [(1, 1000, 0), (2, 1200, 1), (3, 1000, 4), (4, 900, 9)] {
            dir.get_or_create(id, "p");
            dir.update(id, |p| {
                p.rating = rating;
                p.wins = wins;
            });
        }
        let ids: Vec<PlayerId> = dir.leaderboard(3).iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let dir = Arc::new(PlayerDirectory::new());
        dir.get_or_create(1, "shared");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dir = dir.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        dir.update(1, |p| p.currency += 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(dir.get(1).unwrap().currency, 1000 + 800);
    }
}
