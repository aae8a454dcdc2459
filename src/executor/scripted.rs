//! Scripted Executor
//!
//! Deterministic in-process executor. Contest results come from explicit
//! per-pair scripts, falling back to a strength table keyed by artifact path
//! (stronger side wins every game, equal strength ties).
//! Records every call and the peak number of concurrent contests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};

use crate::executor::{ContestantRef, ContestVerdict, ExecutionError, MatchExecutor};
use crate::ladder::record::{GameDetail, GameWinner};

/// Scripted result for one pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    /// Challenger wins every game.
    Win,
    /// Defender wins every game.
    Lose,
    /// Games split evenly.
    Tie,
    /// Executor fails with this error.
    Fail(ExecutionError),
    /// Never returns.
    Hang,
}

/// A call made to the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedCall {
    /// Challenger artifact.
    pub challenger: PathBuf,
    /// Defender artifact.
    pub defender: PathBuf,
    /// Requested game count.
    pub games: u32,
}

/// Deterministic executor for tests and dry runs.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    strengths: BTreeMap<PathBuf, i64>,
    scripts: BTreeMap<(PathBuf, PathBuf), Scripted>,
    delay: Duration,
    gate: Option<Arc<Semaphore>>,
    calls: Mutex<Vec<ScriptedCall>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedExecutor {
    /// Executor where every unscripted contest is a tie.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an artifact's strength.
    pub fn with_strength(mut self, artifact: impl Into<PathBuf>, strength: i64) -> Self {
        self.strengths.insert(artifact.into(), strength);
        self
    }

    /// Script the result of `challenger` vs `defender`.
    pub fn with_script(
        mut self,
        challenger: impl Into<PathBuf>,
        defender: impl Into<PathBuf>,
        result: Scripted,
    ) -> Self {
        self.scripts.insert((challenger.into(), defender.into()), result);
        self
    }

    /// Sleep this long inside every contest.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Hold every contest until `gate` hands out a permit. Each contest consumes one.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Calls made so far, in order.
    pub async fn calls(&self) -> Vec<ScriptedCall> {
        self.calls.lock().await.clone()
    }

    /// Highest number of contests that were running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn resolve(&self, challenger: &Path, defender: &Path) -> Scripted {
        if let Some(script) = self.scripts.get(&(challenger.to_path_buf(), defender.to_path_buf())) {
            return script.clone();
        }
        let c = self.strengths.get(challenger).copied().unwrap_or(0);
        let d = self.strengths.get(defender).copied().unwrap_or(0);
        match c.cmp(&d) {
            std::cmp::Ordering::Greater => Scripted::Win,
            std::cmp::Ordering::Less => Scripted::Lose,
            std::cmp::Ordering::Equal => Scripted::Tie,
        }
    }
}

/// Decrements the in-flight counter even if the contest future is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MatchExecutor for ScriptedExecutor {
    async fn run(
        &self,
        challenger: &ContestantRef,
        defender: &ContestantRef,
        games: u32,
    ) -> Result<ContestVerdict, ExecutionError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        self.calls.lock().await.push(ScriptedCall {
            challenger: challenger.artifact.clone(),
            defender: defender.artifact.clone(),
            games,
        });

        if let Some(gate) = &self.gate {
            // A closed gate releases everything.
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.resolve(&challenger.artifact, &defender.artifact) {
            Scripted::Fail(err) => Err(err),
            Scripted::Hang => std::future::pending().await,
            script => {
                let winner_of = |game: u32| match script {
                    Scripted::Win => GameWinner::Challenger,
                    Scripted::Lose => GameWinner::Defender,
                    _ if games % 2 == 1 && game == games => GameWinner::Draw,
                    _ if game % 2 == 1 => GameWinner::Challenger,
                    _ => GameWinner::Defender,
                };
                let details = (1..=games)
                    .map(|game| GameDetail {
                        game,
                        winner: winner_of(game),
                        duration_secs: 0.0,
                        challenger_first: game % 2 == 1,
                        error: None,
                    })
                    .collect();
                Ok(ContestVerdict::from_games(details))
            }
        }
    }
}
