//! Match Executor
//!
//! The ladder never plays games itself. It hands two contestants to a
//! [`MatchExecutor`] and gets back a verdict over N games, or an error.
//! Errors are resolved by the ladder as a defender win.
//!
//! - `process`: runs the external match program once per contest
//! - `scripted`: deterministic in-process executor for tests and dry runs

pub mod process;
pub mod scripted;

use std::path::PathBuf;
use std::time::Duration;
use async_trait::async_trait;
use serde::{Serialize, Deserialize};

use crate::core::ids::{Challenger, EntryId, OwnerId};
use crate::ladder::entry::Entry;
use crate::ladder::record::{ContestOutcome, GameDetail, GameWinner};

pub use process::{ProcessExecutor, MatchReport};
pub use scripted::ScriptedExecutor;

/// What the executor needs to know about one side of a contest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContestantRef {
    /// Entry identity (`None` for the baseline opponent).
    pub entry_id: Option<EntryId>,
    /// Owner identity (`None` for the baseline opponent).
    pub owner_id: Option<OwnerId>,
    /// Agent to run.
    pub artifact: PathBuf,
}

impl ContestantRef {
    /// The fixed baseline opponent.
    pub fn baseline(artifact: impl Into<PathBuf>) -> Self {
        Self {
            entry_id: None,
            owner_id: None,
            artifact: artifact.into(),
        }
    }
}

impl From<&Challenger> for ContestantRef {
    fn from(c: &Challenger) -> Self {
        Self {
            entry_id: Some(c.entry_id.clone()),
            owner_id: Some(c.owner_id.clone()),
            artifact: c.artifact.clone(),
        }
    }
}

impl From<&Entry> for ContestantRef {
    fn from(e: &Entry) -> Self {
        Self {
            entry_id: Some(e.entry_id.clone()),
            owner_id: Some(e.owner_id.clone()),
            artifact: e.artifact.clone(),
        }
    }
}

/// A verified contest result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContestVerdict {
    /// Overall outcome.
    pub outcome: ContestOutcome,
    /// Games won by the challenger.
    pub challenger_wins: u32,
    /// Games won by the defender.
    pub defender_wins: u32,
    /// Drawn games.
    pub draws: u32,
    /// Per-game detail, ordered by game number.
    pub games: Vec<GameDetail>,
}

impl ContestVerdict {
    /// Build a verdict from per-game results, deciding the outcome by majority.
    pub fn from_games(mut games: Vec<GameDetail>) -> Self {
        games.sort_by_key(|g| g.game);

        let mut challenger_wins = 0;
        let mut defender_wins = 0;
        let mut draws = 0;
        for game in &games {
            match game.winner {
                GameWinner::Challenger => challenger_wins += 1,
                GameWinner::Defender => defender_wins += 1,
                GameWinner::Draw => draws += 1,
            }
        }

        Self {
            outcome: ContestOutcome::from_tally(challenger_wins, defender_wins),
            challenger_wins,
            defender_wins,
            draws,
            games,
        }
    }

    /// Total games played.
    pub fn total_games(&self) -> u32 {
        self.challenger_wins + self.defender_wins + self.draws
    }

    /// Fraction of games the challenger won.
    pub fn challenger_win_rate(&self) -> f64 {
        let total = self.total_games();
        if total == 0 {
            0.0
        } else {
            self.challenger_wins as f64 / total as f64
        }
    }
}

/// Executor failures. The ladder resolves every one of them as a defender win.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// The match program could not be started.
    #[error("failed to spawn match program: {0}")]
    Spawn(String),

    /// The match program exited unsuccessfully.
    #[error("match program exited with {code:?}: {stderr}")]
    NonZeroExit {
        /// Exit code, if the process was not killed by a signal.
        code: Option<i32>,
        /// Tail of stderr.
        stderr: String,
    },

    /// The contest did not finish in time.
    #[error("contest timed out after {0:?}")]
    Timeout(Duration),

    /// The report could not be parsed or is inconsistent.
    #[error("malformed match report: {0}")]
    MalformedOutput(String),

    /// The match program ran but reported a failure.
    #[error("match program reported failure: {0}")]
    Reported(String),
}

/// Plays one contest between two contestants.
///
/// Implementations run games sequentially and must not retry on failure.
#[async_trait]
pub trait MatchExecutor: Send + Sync {
    /// Play `games` games and report the verdict from the challenger's perspective.
    async fn run(
        &self,
        challenger: &ContestantRef,
        defender: &ContestantRef,
        games: u32,
    ) -> Result<ContestVerdict, ExecutionError>;
}
