//! Ladder Updater
//!
//! Drives one challenger's climb:
//!
//! 1. Optional qualifier against the baseline agent.
//! 2. Start at the bottom occupant, or at the ceiling once the ladder is full.
//! 3. Contest each rank upward. A win places the challenger at that rank and
//!    continues; a loss or tie places it one rank below the defender and stops.
//!
//! Empty or own-owner slots are skipped without a contest. Executor failures,
//! including timeouts, are recorded as defender wins.

use std::sync::Arc;
use chrono::Utc;
use serde::{Serialize, Deserialize};
use tracing::{info, warn, debug, instrument};
use uuid::Uuid;

use crate::config::LadderConfig;
use crate::core::ids::Challenger;
use crate::executor::{ContestantRef, ExecutionError, MatchExecutor};
use crate::ladder::entry::{Entry, PlacementOutcome, RankingSnapshot, SnapshotError};
use crate::ladder::events::{EventBus, LadderEvent};
use crate::ladder::record::{ContestOutcome, ContestRecord};
use crate::store::{HistoryStore, RankingStore, StoreError};

/// How a ladder run ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunResult {
    /// Challenger now holds `rank`.
    Placed {
        /// Final rank.
        rank: u32,
        /// Rank the owner held before the run, if any.
        previous: Option<u32>,
    },
    /// The run's final placement was no better than the owner's existing rank.
    Retained {
        /// Rank the owner keeps.
        kept_rank: u32,
        /// Rank the run arrived at.
        proposed_rank: u32,
    },
    /// Challenger failed the baseline qualifier.
    Unqualified,
}

impl RunResult {
    /// Rank the owner holds once the run is over.
    pub fn final_rank(&self) -> Option<u32> {
        match self {
            RunResult::Placed { rank, .. } => Some(*rank),
            RunResult::Retained { kept_rank, .. } => Some(*kept_rank),
            RunResult::Unqualified => None,
        }
    }
}

impl RunResult {
    /// Fold one placement step into the run so far.
    ///
    /// A step discarded against a placement made earlier in the same run keeps
    /// that placement, and `previous` stays the rank held before the run.
    fn then(run: Option<RunResult>, step: RunResult) -> RunResult {
        match (run, step) {
            (Some(placed @ RunResult::Placed { .. }), RunResult::Retained { .. }) => placed,
            (Some(RunResult::Placed { previous, .. }), RunResult::Placed { rank, .. }) => {
                RunResult::Placed { rank, previous }
            }
            (_, step) => step,
        }
    }
}

impl From<PlacementOutcome> for RunResult {
    fn from(outcome: PlacementOutcome) -> Self {
        match outcome {
            PlacementOutcome::Applied { rank, previous } => RunResult::Placed { rank, previous },
            PlacementOutcome::Discarded { kept_rank, proposed_rank } => {
                RunResult::Retained { kept_rank, proposed_rank }
            }
        }
    }
}

/// One challenger's completed climb.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Who climbed.
    pub challenger: Challenger,
    /// How it ended.
    pub result: RunResult,
    /// Contests played, in order.
    pub contests: Vec<ContestRecord>,
}

/// Errors that abort a run without placing the challenger.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Ranking or history store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A placement produced an invalid ladder.
    #[error("ladder invariant violated: {0}")]
    Invariant(#[from] SnapshotError),

    /// The run task panicked.
    #[error("run panicked: {0}")]
    Panicked(String),
}

/// First rank a challenger contests, or `None` when the ladder is empty.
pub fn starting_rank(snapshot: &RankingSnapshot, ceiling: u32) -> Option<u32> {
    let n = snapshot.len() as u32;
    if n == 0 {
        None
    } else if n < ceiling {
        if snapshot.entry_at(n).is_some() {
            Some(n)
        } else {
            Some(n + 1)
        }
    } else {
        Some(ceiling)
    }
}

/// Runs climbs against the stores. One run at a time is enforced by the queue.
pub struct LadderUpdater {
    config: LadderConfig,
    ranking: Arc<dyn RankingStore>,
    history: Arc<dyn HistoryStore>,
    executor: Arc<dyn MatchExecutor>,
    events: EventBus,
}

impl LadderUpdater {
    /// Create an updater.
    pub fn new(
        config: LadderConfig,
        ranking: Arc<dyn RankingStore>,
        history: Arc<dyn HistoryStore>,
        executor: Arc<dyn MatchExecutor>,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            ranking,
            history,
            executor,
            events,
        }
    }

    /// Run the full climb for one challenger.
    #[instrument(skip(self, challenger), fields(entry = %challenger.entry_id, owner = %challenger.owner_id))]
    pub async fn run(&self, challenger: &Challenger) -> Result<RunSummary, RunError> {
        self.events.publish(LadderEvent::RunStarted {
            entry_id: challenger.entry_id.clone(),
            owner_id: challenger.owner_id.clone(),
        });

        let mut contests = Vec::new();
        let result = self.climb(challenger, &mut contests).await?;

        info!(
            "Run finished after {} contests: {:?}",
            contests.len(),
            result
        );
        self.events.publish(LadderEvent::RunFinished {
            entry_id: challenger.entry_id.clone(),
            result: result.clone(),
            contests: contests.len(),
        });

        Ok(RunSummary {
            challenger: challenger.clone(),
            result,
            contests,
        })
    }

    async fn climb(
        &self,
        challenger: &Challenger,
        contests: &mut Vec<ContestRecord>,
    ) -> Result<RunResult, RunError> {
        if let Some(baseline) = &self.config.baseline {
            let record = self
                .contest(challenger, ContestantRef::baseline(baseline), None)
                .await?;
            let qualified = record.outcome.challenger_advances();
            contests.push(record);
            if !qualified {
                info!("Challenger did not beat the baseline");
                self.refresh_tallies().await?;
                return Ok(RunResult::Unqualified);
            }
        }

        let snapshot = self.ranking.load().await?;
        let Some(mut rank) = starting_rank(&snapshot, self.config.ceiling) else {
            debug!("Empty ladder, placing at rank 1");
            return self.place(challenger, 1).await;
        };

        let mut result = None;
        while rank >= 1 {
            // Re-read every round; the slot may have moved since the last placement.
            let snapshot = self.ranking.load().await?;
            let Some(defender) = snapshot.entry_at(rank).cloned() else {
                debug!("No defender at rank {}, skipping", rank);
                rank -= 1;
                continue;
            };

            if defender.owner_id == challenger.owner_id {
                debug!("Rank {} is held by the same owner, skipping", rank);
                rank -= 1;
                continue;
            }

            let record = self
                .contest(challenger, ContestantRef::from(&defender), Some(rank))
                .await?;
            let advances = record.outcome.challenger_advances();
            contests.push(record);

            if advances {
                let step = self.place(challenger, rank).await?;
                result = Some(RunResult::then(result, step));
                if rank == 1 {
                    break;
                }
                rank -= 1;
            } else {
                let step = self.place(challenger, rank + 1).await?;
                result = Some(RunResult::then(result, step));
                break;
            }
        }

        // Every slot was skipped: nothing beat the challenger, so it may take the top.
        match result {
            Some(result) => Ok(result),
            None => self.place(challenger, 1).await,
        }
    }

    /// Play one contest, resolve failures as defender wins, append the record.
    async fn contest(
        &self,
        challenger: &Challenger,
        defender: ContestantRef,
        rank: Option<u32>,
    ) -> Result<ContestRecord, RunError> {
        let games = self.config.games_per_contest;
        let timeout = self.config.contest_timeout;
        let challenger_ref = ContestantRef::from(challenger);

        debug!(
            "Contesting rank {:?} against {}",
            rank,
            defender.artifact.display()
        );
        let verdict = match tokio::time::timeout(
            timeout,
            self.executor.run(&challenger_ref, &defender, games),
        )
        .await
        {
            Ok(verdict) => verdict,
            Err(_) => Err(ExecutionError::Timeout(timeout)),
        };

        let base = ContestRecord {
            id: Uuid::new_v4(),
            challenger: challenger.entry_id.clone(),
            challenger_owner: challenger.owner_id.clone(),
            defender: defender.entry_id.clone(),
            defender_owner: defender.owner_id.clone(),
            rank,
            outcome: ContestOutcome::DefenderWin,
            challenger_wins: 0,
            defender_wins: games,
            draws: 0,
            games: Vec::new(),
            timestamp: Utc::now(),
            diagnostics: None,
        };

        let record = match verdict {
            Ok(verdict) => ContestRecord {
                outcome: verdict.outcome,
                challenger_wins: verdict.challenger_wins,
                defender_wins: verdict.defender_wins,
                draws: verdict.draws,
                games: verdict.games,
                ..base
            },
            Err(err) => {
                warn!("Contest failed, resolving as defender win: {}", err);
                ContestRecord {
                    diagnostics: Some(err.to_string()),
                    ..base
                }
            }
        };

        self.history.append(&record).await?;
        self.events
            .publish(LadderEvent::ContestResolved(Box::new(record.clone())));
        Ok(record)
    }

    /// Apply the promotion rule at `rank` and write the ladder back.
    async fn place(&self, challenger: &Challenger, rank: u32) -> Result<RunResult, RunError> {
        let mut snapshot = self.ranking.load().await?;
        let history = self.history.all().await?;

        let outcome = snapshot.apply_placement(Entry::for_challenger(challenger, Utc::now()), rank);
        snapshot.refresh_tallies(&history);
        snapshot.validate()?;
        self.ranking.replace(&snapshot).await?;

        match &outcome {
            PlacementOutcome::Applied { rank, previous } => {
                info!("Placed at rank {} (previously {:?})", rank, previous)
            }
            PlacementOutcome::Discarded { kept_rank, proposed_rank } => debug!(
                "Rank {} is not better than held rank {}, discarded",
                proposed_rank, kept_rank
            ),
        }
        Ok(outcome.into())
    }

    /// Rewrite the ladder with tallies replayed from history.
    async fn refresh_tallies(&self) -> Result<(), RunError> {
        let mut snapshot = self.ranking.load().await?;
        let history = self.history.all().await?;
        snapshot.refresh_tallies(&history);
        self.ranking.replace(&snapshot).await?;
        Ok(())
    }
}
