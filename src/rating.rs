// Ranked rating adjustment.
//
// Flat adjustment: the winner gains a fixed amount, the loser drops by half
// of it, never below the floor.

use crate::engine::config::{RANKED_LOSS_PENALTY, RANKED_WIN_GAIN};

pub const STARTING_RATING: i32 = 1000;
pub const RATING_FLOOR: i32 = 100;

/// Match outcome from perspective of one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Loss,
}

/// Calculate the new rating after a ranked duel.
pub fn calculate_new_rating(rating: i32, outcome: Outcome) -> i32 {
    match outcome {
        Outcome::Win => rating + RANKED_WIN_GAIN,
        Outcome::Loss => (rating - RANKED_LOSS_PENALTY).max(RATING_FLOOR),
    }
}

/// Whether two ratings are close enough to be paired.
pub fn within_window(rating_a: i32, rating_b: i32, window: i32) -> bool {
    (rating_a - rating_b).abs() <= window
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_win_gain() {
        assert_eq!(calculate_new_rating(1000, Outcome::Win), 1025);
    }

    #[test]
    fn test_loss_is_half_of_gain() {
        assert_eq!(calculate_new_rating(1000, Outcome::Loss), 988);
    }

    #[test]
    fn test_rating_floor() {
        assert_eq!(calculate_new_rating(105, Outcome::Loss), RATING_FLOOR);
        assert_eq!(calculate_new_rating(RATING_FLOOR, Outcome::Loss), RATING_FLOOR);
    }

    #[test]
    fn test_win_at_floor() {
        assert_eq!(calculate_new_rating(RATING_FLOOR, Outcome::Win), 125);
    }

    #[test]
    fn test_window() {
        assert!(within_window(1000, 1200, 200));
        assert!(within_window(1200, 1000, 200));
        assert!(!within_window(1000, 1201, 200));
    }
}
