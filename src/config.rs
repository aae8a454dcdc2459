//! Ladder Configuration
//!
//! Defaults suit a 15x15 gomoku ladder with a top-10 ceiling.
//! Every field can be overridden from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Ladder configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LadderConfig {
    /// Deepest rank a new challenger starts climbing from.
    pub ceiling: u32,
    /// Games played per contest.
    pub games_per_contest: u32,
    /// Board size passed to the match program.
    pub board_size: u32,
    /// Hard bound on one contest.
    pub contest_timeout: Duration,
    /// Directory holding `ranking.json` and `history.json`.
    pub data_dir: PathBuf,
    /// Match program to spawn.
    pub executor_program: PathBuf,
    /// Leading arguments for the match program.
    pub executor_args: Vec<String>,
    /// Optional baseline agent every challenger must beat first.
    pub baseline: Option<PathBuf>,
    /// Buffered ladder events per subscriber.
    pub event_capacity: usize,
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            ceiling: 10,
            games_per_contest: 10,
            board_size: 15,
            contest_timeout: Duration::from_secs(300),
            data_dir: PathBuf::from("./data"),
            executor_program: PathBuf::from("python3"),
            executor_args: vec!["match.py".to_string()],
            baseline: None,
            event_capacity: 256,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A value could not be parsed or is out of range.
    #[error("invalid value {value:?} for {key}")]
    Invalid {
        /// Environment key or field name.
        key: String,
        /// Offending value.
        value: String,
    },
}

impl LadderConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            ceiling: parse_or(&lookup, "LADDER_CEILING", defaults.ceiling)?,
            games_per_contest: parse_or(&lookup, "LADDER_GAMES", defaults.games_per_contest)?,
            board_size: parse_or(&lookup, "LADDER_BOARD_SIZE", defaults.board_size)?,
            contest_timeout: Duration::from_secs(parse_or(
                &lookup,
                "LADDER_CONTEST_TIMEOUT_SECS",
                defaults.contest_timeout.as_secs(),
            )?),
            data_dir: lookup("LADDER_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            executor_program: lookup("LADDER_EXECUTOR")
                .map(PathBuf::from)
                .unwrap_or(defaults.executor_program),
            executor_args: lookup("LADDER_EXECUTOR_ARGS")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or(defaults.executor_args),
            baseline: lookup("LADDER_BASELINE")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            event_capacity: parse_or(&lookup, "LADDER_EVENT_CAPACITY", defaults.event_capacity)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the ladder cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("ceiling", self.ceiling == 0, self.ceiling.to_string()),
            ("games_per_contest", self.games_per_contest == 0, self.games_per_contest.to_string()),
            ("board_size", self.board_size == 0, self.board_size.to_string()),
            ("contest_timeout", self.contest_timeout.is_zero(), format!("{:?}", self.contest_timeout)),
            ("event_capacity", self.event_capacity == 0, self.event_capacity.to_string()),
        ];

        for (key, invalid, value) in checks {
            if invalid {
                return Err(ConfigError::Invalid {
                    key: key.to_string(),
                    value,
                });
            }
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value: raw,
        }),
        None => Ok(default),
    }
}
