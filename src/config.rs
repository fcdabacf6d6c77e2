// Application configuration, loaded from environment variables and CLI flags.

use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_ROUND_TIMEOUT_SECS: u64 = 120;
const DEFAULT_EXPIRY_SCAN_SECS: u64 = 5;
const DEFAULT_RATING_WINDOW: i32 = 200;
const DEFAULT_REPLAY_CAPACITY: usize = 256;

/// Application configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// How long a round may stay open before the expiry scan ends it.
    pub round_timeout: Duration,
    /// How often the expiry scan runs.
    pub expiry_scan_interval: Duration,
    /// Maximum rating difference for a ranked pairing.
    pub rating_window: i32,
    /// Seed for duel randomness. `None` seeds from OS entropy.
    pub rng_seed: Option<u64>,
    /// JSON move catalog. `None` uses the built-in catalog.
    pub moves_file: Option<PathBuf>,
    /// Number of finished-duel replays kept in memory.
    pub replay_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            round_timeout: Duration::from_secs(DEFAULT_ROUND_TIMEOUT_SECS),
            expiry_scan_interval: Duration::from_secs(DEFAULT_EXPIRY_SCAN_SECS),
            rating_window: DEFAULT_RATING_WINDOW,
            rng_seed: None,
            moves_file: None,
            replay_capacity: DEFAULT_REPLAY_CAPACITY,
        }
    }
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `PORT` - HTTP server port (default: 3000)
    /// - `ROUND_TIMEOUT_SECS` - round timeout (default: 120)
    /// - `EXPIRY_SCAN_SECS` - expiry scan interval (default: 5)
    /// - `RATING_WINDOW` - ranked matchmaking window (default: 200)
    /// - `RNG_SEED` - fixed seed for duel randomness
    /// - `MOVES_FILE` - path to a JSON move catalog
    /// - `REPLAY_CAPACITY` - replays kept in memory (default: 256)
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    /// - `--seed <SEED>` - Override the RNG seed
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    /// Build a configuration from CLI args and an env lookup. Unparseable
    /// values fall back to the default.
    pub fn from_sources(args: &[String], env: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        // CLI flag takes precedence, then env var, then default
        let port = Self::parse_cli_value(args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| env("PORT").and_then(|v| v.parse().ok()))
            .unwrap_or(defaults.port);

        let rng_seed = Self::parse_cli_value(args, "--seed")
            .and_then(|v| v.parse().ok())
            .or_else(|| env("RNG_SEED").and_then(|v| v.parse().ok()));

        let secs = |key: &str, default: Duration| {
            env(key)
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|&s| s > 0)
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Config {
            port,
            round_timeout: secs("ROUND_TIMEOUT_SECS", defaults.round_timeout),
            expiry_scan_interval: secs("EXPIRY_SCAN_SECS", defaults.expiry_scan_interval),
            rating_window: env("RATING_WINDOW")
                .and_then(|v| v.parse().ok())
                .filter(|&w: &i32| w >= 0)
                .unwrap_or(defaults.rating_window),
            rng_seed,
            moves_file: env("MOVES_FILE")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            replay_capacity: env("REPLAY_CAPACITY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.replay_capacity),
        }
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}
