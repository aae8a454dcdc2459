//! External Match Program
//!
//! Runs one child process per contest and parses the JSON report it prints:
//!
//! ```text
//! <program> <args..> --challenger <path> --defender <path> --games <n> --board-size <s> --silent
//! ```
//!
//! The child is killed if the contest exceeds the timeout.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use async_trait::async_trait;
use serde::{Serialize, Deserialize};
use tokio::process::Command;
use tracing::{debug, warn, instrument};

use crate::config::LadderConfig;
use crate::executor::{ContestantRef, ContestVerdict, ExecutionError, MatchExecutor};
use crate::ladder::record::{ContestOutcome, GameDetail, GameWinner};

/// Stderr bytes kept in a `NonZeroExit` error.
const STDERR_TAIL: usize = 512;

// =============================================================================
// REPORT FORMAT
// =============================================================================

/// JSON report printed by the match program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchReport {
    /// "challenger", "defender" or "tie".
    #[serde(default)]
    pub winner: Option<String>,
    /// Games won by the challenger.
    pub challenger_wins: u32,
    /// Games won by the defender.
    pub defender_wins: u32,
    /// Drawn games.
    #[serde(default)]
    pub draws: u32,
    /// Per-game detail.
    #[serde(default)]
    pub games: Vec<ReportGame>,
    /// False when the match program failed as a whole.
    #[serde(default = "default_success")]
    pub success: bool,
    /// Failure reason when `success` is false.
    #[serde(default)]
    pub error: Option<String>,
}

fn default_success() -> bool {
    true
}

/// One game in a [`MatchReport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportGame {
    /// 1-based game number.
    pub game: u32,
    /// 0 draw, 1 challenger, 2 defender.
    pub winner: u8,
    /// Seconds.
    #[serde(default)]
    pub duration: f64,
    /// Whether the challenger moved first.
    #[serde(default)]
    pub challenger_first: bool,
    /// Error raised while playing.
    #[serde(default)]
    pub error: Option<String>,
}

impl MatchReport {
    /// Parse the program's stdout.
    pub fn parse(stdout: &[u8]) -> Result<Self, ExecutionError> {
        serde_json::from_slice(stdout)
            .map_err(|e| ExecutionError::MalformedOutput(e.to_string()))
    }

    /// Validate the report and turn it into a verdict.
    pub fn into_verdict(self) -> Result<ContestVerdict, ExecutionError> {
        if !self.success {
            return Err(ExecutionError::Reported(
                self.error.unwrap_or_else(|| "unknown failure".to_string()),
            ));
        }

        let games = self
            .games
            .into_iter()
            .map(|g| {
                let winner = GameWinner::from_code(g.winner).ok_or_else(|| {
                    ExecutionError::MalformedOutput(format!(
                        "game {} has unknown winner code {}",
                        g.game, g.winner
                    ))
                })?;
                Ok(GameDetail {
                    game: g.game,
                    winner,
                    duration_secs: g.duration,
                    challenger_first: g.challenger_first,
                    error: g.error,
                })
            })
            .collect::<Result<Vec<_>, ExecutionError>>()?;

        let verdict = if games.is_empty() {
            ContestVerdict {
                outcome: ContestOutcome::from_tally(self.challenger_wins, self.defender_wins),
                challenger_wins: self.challenger_wins,
                defender_wins: self.defender_wins,
                draws: self.draws,
                games,
            }
        } else {
            let verdict = ContestVerdict::from_games(games);
            if verdict.challenger_wins != self.challenger_wins
                || verdict.defender_wins != self.defender_wins
                || verdict.draws != self.draws
            {
                return Err(ExecutionError::MalformedOutput(format!(
                    "tallies {}-{}-{} disagree with game list {}-{}-{}",
                    self.challenger_wins, self.defender_wins, self.draws,
                    verdict.challenger_wins, verdict.defender_wins, verdict.draws,
                )));
            }
            verdict
        };

        if let Some(declared) = self.winner.as_deref() {
            let expected = match verdict.outcome {
                ContestOutcome::ChallengerWin => "challenger",
                ContestOutcome::DefenderWin => "defender",
                ContestOutcome::Tie => "tie",
            };
            if declared != expected {
                return Err(ExecutionError::MalformedOutput(format!(
                    "declared winner {declared:?} but tallies say {expected:?}"
                )));
            }
        }

        Ok(verdict)
    }
}

// =============================================================================
// PROCESS EXECUTOR
// =============================================================================

/// Executor that shells out to the match program.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    program: PathBuf,
    args: Vec<String>,
    board_size: u32,
    timeout: Duration,
    working_dir: Option<PathBuf>,
}

impl ProcessExecutor {
    /// Create an executor running `program` with leading `args`.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            board_size: 15,
            timeout: Duration::from_secs(300),
            working_dir: None,
        }
    }

    /// Build from ladder configuration.
    pub fn from_config(config: &LadderConfig) -> Self {
        Self::new(config.executor_program.clone(), config.executor_args.clone())
            .with_board_size(config.board_size)
            .with_timeout(config.contest_timeout)
    }

    /// Set the board size passed to the program.
    pub fn with_board_size(mut self, board_size: u32) -> Self {
        self.board_size = board_size;
        self
    }

    /// Set the per-contest timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the program from `dir`.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn command(&self, challenger: &ContestantRef, defender: &ContestantRef, games: u32) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--challenger")
            .arg(&challenger.artifact)
            .arg("--defender")
            .arg(&defender.artifact)
            .arg("--games")
            .arg(games.to_string())
            .arg("--board-size")
            .arg(self.board_size.to_string())
            .arg("--silent")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl MatchExecutor for ProcessExecutor {
    #[instrument(skip_all, fields(
        challenger = %challenger.artifact.display(),
        defender = %defender.artifact.display(),
        games = games,
    ))]
    async fn run(
        &self,
        challenger: &ContestantRef,
        defender: &ContestantRef,
        games: u32,
    ) -> Result<ContestVerdict, ExecutionError> {
        let started = Instant::now();
        let child = self
            .command(challenger, defender, games)
            .spawn()
            .map_err(|e| ExecutionError::Spawn(e.to_string()))?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| ExecutionError::Spawn(e.to_string()))?,
            Err(_) => {
                warn!("Match program exceeded {:?}, killed", self.timeout);
                return Err(ExecutionError::Timeout(self.timeout));
            }
        };

        if !output.status.success() {
            return Err(ExecutionError::NonZeroExit {
                code: output.status.code(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        let verdict = MatchReport::parse(&output.stdout)?.into_verdict()?;
        debug!(
            "Contest finished in {:.1}s: {}-{}-{}",
            started.elapsed().as_secs_f64(),
            verdict.challenger_wins,
            verdict.defender_wins,
            verdict.draws,
        );
        Ok(verdict)
    }
}

/// Last `STDERR_TAIL` bytes of stderr, on a char boundary.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim_end();
    let mut start = text.len().saturating_sub(STDERR_TAIL);
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}
