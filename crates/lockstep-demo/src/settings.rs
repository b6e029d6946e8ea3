//! Demo settings read from the environment.

use lockstep_phased::ExecutorConfig;

pub const BATCH_ENV: &str = "LOCKSTEP_BATCH";
pub const ROUNDS_ENV: &str = "LOCKSTEP_ROUNDS";

const DEFAULT_BATCH: usize = 16;
const DEFAULT_ROUNDS: usize = 3;

#[derive(Debug, Clone)]
pub struct Settings {
    pub executor: ExecutorConfig,
    /// Deposits submitted per round.
    pub batch: usize,
    /// Unguarded rounds to run.
    pub rounds: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::default(),
            batch: DEFAULT_BATCH,
            rounds: DEFAULT_ROUNDS,
        }
    }
}

impl Settings {
    /// Defaults overridden by `LOCKSTEP_THREADS`, `LOCKSTEP_BATCH` and
    /// `LOCKSTEP_ROUNDS` where they parse.
    pub fn from_env() -> Self {
        Self {
            executor: ExecutorConfig::from_env(),
            batch: env_usize(BATCH_ENV).unwrap_or(DEFAULT_BATCH),
            rounds: env_usize(ROUNDS_ENV).unwrap_or(DEFAULT_ROUNDS),
        }
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| parse_usize(&v))
}

fn parse_usize(value: &str) -> Option<usize> {
    value.trim().parse().ok()
}
