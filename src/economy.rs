// Kingdom economy: resource collection, daily bonus, raids, buildings and
// the move-group shop. Every action mutates one player under that player's
// lock and uses the same carry-over levelling as duel settlement.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::moves::MoveGroup;
use crate::players::{Player, PlayerDirectory, PlayerId};

pub const FOOD_PER_FARM: i64 = 60;
pub const GOLD_PER_MINE: i64 = 40;
pub const COLLECT_EXP: i64 = 20;
pub const BUILD_EXP: i64 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EconomyError {
    #[error("player {0} not found")]
    UnknownPlayer(PlayerId),
    #[error("not enough gold: need {needed}, have {available}")]
    InsufficientGold { needed: i64, available: i64 },
    #[error("not enough wood: need {needed}, have {available}")]
    InsufficientWood { needed: i64, available: i64 },
    #[error("daily bonus already claimed today")]
    BonusAlreadyClaimed,
    #[error("move group '{0}' is already unlocked")]
    AlreadyUnlocked(MoveGroup),
}

/// Signed resource changes applied by one action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub gold: i64,
    pub food: i64,
    pub wood: i64,
    pub iron: i64,
    pub exp: i64,
    pub leveled_up: bool,
    pub level: u32,
}

impl Receipt {
    fn apply(mut self, player: &mut Player) -> Self {
        player.currency += self.gold;
        player.kingdom.food += self.food;
        player.kingdom.wood += self.wood;
        player.kingdom.iron += self.iron;
        self.leveled_up = player.add_experience(self.exp);
        self.level = player.level;
        if self.leveled_up {
            tracing::info!(player_id = player.id, level = player.level, "Player leveled up");
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaidTarget {
    Weak,
    Medium,
    Strong,
}

impl RaidTarget {
    /// Gold cost, gold reward, food reward, experience.
    fn table(self) -> (i64, i64, i64, i64) {
        match self {
            RaidTarget::Weak => (50, 100, 50, 30),
            RaidTarget::Medium => (150, 250, 120, 70),
            RaidTarget::Strong => (300, 500, 250, 150),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Building {
    Farm,
    Mine,
    Barracks,
}

impl Building {
    pub fn wood_cost(self) -> i64 {
        match self {
            Building::Farm => 100,
            Building::Mine => 150,
            Building::Barracks => 200,
        }
    }
}

fn with_player<R>(
    directory: &PlayerDirectory,
    id: PlayerId,
    f: impl FnOnce(&mut Player) -> Result<R, EconomyError>,
) -> Result<R, EconomyError> {
    directory
        .update(id, f)
        .unwrap_or(Err(EconomyError::UnknownPlayer(id)))
}

fn require_gold(player: &Player, needed: i64) -> Result<(), EconomyError> {
    if player.currency < needed {
        return Err(EconomyError::InsufficientGold {
            needed,
            available: player.currency,
        });
    }
    Ok(())
}

/// Harvest food from farms and gold from mines.
pub fn collect(directory: &PlayerDirectory, id: PlayerId) -> Result<Receipt, EconomyError> {
    with_player(directory, id, |p| {
        let receipt = Receipt {
            food: i64::from(p.kingdom.farms) * FOOD_PER_FARM,
            gold: i64::from(p.kingdom.mines) * GOLD_PER_MINE,
            exp: COLLECT_EXP,
            ..Receipt::default()
        };
        Ok(receipt.apply(p))
    })
}

/// Claim the once-per-day bonus for `today`.
pub fn daily_bonus(
    directory: &PlayerDirectory,
    id: PlayerId,
    today: NaiveDate,
) -> Result<Receipt, EconomyError> {
    with_player(directory, id, |p| {
        if p.last_bonus == Some(today) {
            return Err(EconomyError::BonusAlreadyClaimed);
        }
        p.last_bonus = Some(today);
        let receipt = Receipt {
            gold: 200,
            food: 150,
            wood: 100,
            iron: 50,
            exp: 50,
            ..Receipt::default()
        };
        Ok(receipt.apply(p))
    })
}

/// Raid an NPC camp. The cost is paid up front; raids always succeed.
pub fn raid(
    directory: &PlayerDirectory,
    id: PlayerId,
    target: RaidTarget,
) -> Result<Receipt, EconomyError> {
    let (cost, gold, food, exp) = target.table();
    with_player(directory, id, |p| {
        require_gold(p, cost)?;
        let receipt = Receipt {
            gold: gold - cost,
            food,
            exp,
            ..Receipt::default()
        };
        Ok(receipt.apply(p))
    })
}

/// Add one building, paid in wood.
pub fn build(
    directory: &PlayerDirectory,
    id: PlayerId,
    building: Building,
) -> Result<Receipt, EconomyError> {
    let cost = building.wood_cost();
    with_player(directory, id, |p| {
        if p.kingdom.wood < cost {
            return Err(EconomyError::InsufficientWood {
                needed: cost,
                available: p.kingdom.wood,
            });
        }
        match building {
            Building::Farm => p.kingdom.farms += 1,
            Building::Mine => p.kingdom.mines += 1,
            Building::Barracks => p.kingdom.barracks += 1,
        }
        let receipt = Receipt {
            wood: -cost,
            exp: BUILD_EXP,
            ..Receipt::default()
        };
        Ok(receipt.apply(p))
    })
}

/// Buy a move group from the shop.
pub fn buy_move_group(
    directory: &PlayerDirectory,
    id: PlayerId,
    group: MoveGroup,
) -> Result<Receipt, EconomyError> {
    with_player(directory, id, |p| {
        if p.has_group(group) {
            return Err(EconomyError::AlreadyUnlocked(group));
        }
        let price = group.price();
        require_gold(p, price)?;
        p.unlocked_groups.insert(group);
        tracing::info!(player_id = p.id, %group, "Move group unlocked");
        let receipt = Receipt {
            gold: -price,
            ..Receipt::default()
        };
        Ok(receipt.apply(p))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> PlayerDirectory {
        let dir = PlayerDirectory::new();
        dir.get_or_create(1, "builder");
        dir
    }

    #[test]
    fn test_collect_uses_buildings() {
        let dir = directory();
        dir.update(1, |p| {
            p.kingdom.farms = 2;
            p.kingdom.mines = 3;
        });
        let receipt = collect(&dir, 1).unwrap();
        assert_eq!(receipt.food, 120);
        assert_eq!(receipt.gold, 120);
        let p = dir.get(1).unwrap();
        assert_eq!(p.kingdom.food, 620);
        assert_eq!(p.currency, 1120);
        assert_eq!(p.experience, 20);
    }

    #[test]
    fn test_daily_bonus_once_per_day() {
        let dir = directory();
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let receipt = daily_bonus(&dir, 1, today).unwrap();
        assert_eq!(receipt.gold, 200);
        assert_eq!(
            daily_bonus(&dir, 1, today),
            Err(EconomyError::BonusAlreadyClaimed)
        );
        let tomorrow = today.succ_opt().unwrap();
        assert!(daily_bonus(&dir, 1, tomorrow).is_ok());
        let p = dir.get(1).unwrap();
        assert_eq!(p.currency, 1400);
        assert_eq!(p.kingdom.iron, 300);
        // 100 exp from two bonuses crosses the level-1 threshold exactly.
        assert_eq!(p.level, 2);
        assert_eq!(p.experience, 0);
    }

    #[test]
    fn test_raid_costs_and_rewards() {
        let dir = directory();
        let receipt = raid(&dir, 1, RaidTarget::Strong).unwrap();
        assert_eq!(receipt.gold, 200);
        assert_eq!(receipt.food, 250);
        assert!(receipt.leveled_up);
        let p = dir.get(1).unwrap();
        assert_eq!(p.currency, 1200);
        assert_eq!(p.level, 2);
        assert_eq!(p.experience, 50);
    }

    #[test]
    fn test_raid_requires_gold() {
        let dir = directory();
        dir.update(1, |p| p.currency = 40);
        assert_eq!(
            raid(&dir, 1, RaidTarget::Weak),
            Err(EconomyError::InsufficientGold {
                needed: 50,
                available: 40
            })
        );
        assert_eq!(dir.get(1).unwrap().currency, 40);
    }

    #[test]
    fn test_build_spends_wood() {
        let dir = directory();
        build(&dir, 1, Building::Mine).unwrap();
        let p = dir.get(1).unwrap();
        assert_eq!(p.kingdom.mines, 2);
        assert_eq!(p.kingdom.wood, 150);
        assert!(matches!(
            build(&dir, 1, Building::Barracks),
            Err(EconomyError::InsufficientWood { needed: 200, .. })
        ));
        assert_eq!(dir.get(1).unwrap().kingdom.barracks, 1);
    }

    #[test]
    fn test_shop_unlocks_group_once() {
        let dir = directory();
        assert_eq!(
            buy_move_group(&dir, 1, MoveGroup::Basic),
            Err(EconomyError::AlreadyUnlocked(MoveGroup::Basic))
        );
        let receipt = buy_move_group(&dir, 1, MoveGroup::Elite).unwrap();
        assert_eq!(receipt.gold, -800);
        assert!(dir.get(1).unwrap().has_group(MoveGroup::Elite));
        assert!(matches!(
            buy_move_group(&dir, 1, MoveGroup::Advanced),
            Err(EconomyError::InsufficientGold { needed: 300, .. })
        ));
    }

    #[test]
    fn test_unknown_player() {
        let dir = PlayerDirectory::new();
        assert_eq!(collect(&dir, 5), Err(EconomyError::UnknownPlayer(5)));
    }
}
