// Duel rules
pub const MAX_HEALTH: i32 = 10;
pub const FIRST_ROUND: u32 = 1;
// Upper bound on catalog power and counter damage
pub const MAX_MOVE_MAGNITUDE: i32 = MAX_HEALTH * 10;

// Settlement rewards
pub const WINNER_EXP: i64 = 25;
pub const LOSER_EXP: i64 = WINNER_EXP / 2;
pub const WINNER_CURRENCY: i64 = 15;

// Ranked rating adjustment (loss is half the gain)
pub const RANKED_WIN_GAIN: i32 = 25;
pub const RANKED_LOSS_PENALTY: i32 = RANKED_WIN_GAIN / 2;

// Experience needed per level (threshold = level * EXP_PER_LEVEL)
pub const EXP_PER_LEVEL: i64 = 100;

// New player defaults
pub const STARTING_LEVEL: u32 = 1;
pub const STARTING_CURRENCY: i64 = 1000;

// Duel id suffix length (hex chars of a v4 uuid)
pub const DUEL_ID_SUFFIX_LEN: usize = 8;

// Broadcast channel capacity for duel events
pub const EVENT_CHANNEL_CAPACITY: usize = 256;
