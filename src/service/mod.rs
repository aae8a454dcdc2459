//! Ladder Service
//!
//! Facade that wires configuration, stores, executor, updater and queue, and
//! exposes the external operations: submit, queue status, ranking, history,
//! clear, cancel. Also dispatches [`protocol::LadderRequest`] messages.

pub mod protocol;

use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{ConfigError, LadderConfig};
use crate::core::ids::{Challenger, EntryId, OwnerId};
use crate::executor::{MatchExecutor, ProcessExecutor};
use crate::ladder::events::{EventBus, EventEnvelope};
use crate::ladder::queue::{AdmissionError, ChallengeQueue, QueueStatus};
use crate::ladder::record::ContestRecord;
use crate::ladder::updater::LadderUpdater;
use crate::store::{
    HistoryStore, JsonHistoryStore, JsonRankingStore, MemoryHistoryStore, MemoryRankingStore,
    RankingStore, StoreError,
};

pub use protocol::{LadderRequest, LadderResponse, RankingRow, SubmitReceipt};

/// Running ladder: one queue, one worker, one pair of stores.
pub struct LadderService {
    ranking: Arc<dyn RankingStore>,
    history: Arc<dyn HistoryStore>,
    queue: Arc<ChallengeQueue>,
    events: EventBus,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LadderService {
    /// Wire a service and start its queue worker. Must be called inside a tokio runtime.
    pub fn new(
        config: LadderConfig,
        ranking: Arc<dyn RankingStore>,
        history: Arc<dyn HistoryStore>,
        executor: Arc<dyn MatchExecutor>,
    ) -> Self {
        let events = EventBus::new(config.event_capacity);
        let queue = ChallengeQueue::new(events.clone());
        let updater = Arc::new(LadderUpdater::new(
            config,
            ranking.clone(),
            history.clone(),
            executor,
            events.clone(),
        ));
        let worker = queue.spawn_worker(updater);

        Self {
            ranking,
            history,
            queue,
            events,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Service backed by in-memory stores.
    pub fn in_memory(config: LadderConfig, executor: Arc<dyn MatchExecutor>) -> Self {
        Self::new(
            config,
            Arc::new(MemoryRankingStore::new()),
            Arc::new(MemoryHistoryStore::new()),
            executor,
        )
    }

    /// Service backed by JSON files under `config.data_dir`, running the configured match program.
    pub fn from_config(config: LadderConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let ranking = Arc::new(JsonRankingStore::in_dir(&config.data_dir));
        let history = Arc::new(JsonHistoryStore::in_dir(&config.data_dir));
        let executor = Arc::new(ProcessExecutor::from_config(&config));

        info!(
            "Ladder data in {:?}, ceiling {}, {} games per contest",
            config.data_dir, config.ceiling, config.games_per_contest
        );
        Ok(Self::new(config, ranking, history, executor))
    }

    /// Admit a challenger. A challenger that is already pending is reported, not re-queued.
    pub async fn submit(&self, challenger: Challenger) -> Result<SubmitReceipt, AdmissionError> {
        let entry_id = challenger.entry_id.clone();
        match self.queue.enqueue(challenger).await {
            Ok(queue_position) => Ok(SubmitReceipt {
                entry_id,
                accepted: true,
                queue_position,
            }),
            Err(AdmissionError::DuplicateAdmission { entry_id, position }) => {
                warn!("Duplicate admission for {} (position {})", entry_id, position);
                Ok(SubmitReceipt {
                    entry_id,
                    accepted: false,
                    queue_position: position,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Pending sequence and busy flag.
    pub async fn queue_status(&self) -> QueueStatus {
        self.queue.status().await
    }

    /// Current ranking, best first.
    pub async fn ranking(&self) -> Result<Vec<RankingRow>, StoreError> {
        let snapshot = self.ranking.load().await?;
        Ok(snapshot.entries().iter().map(RankingRow::from).collect())
    }

    /// Contests the owner took part in, on either side, in log order.
    pub async fn history(&self, owner: &OwnerId) -> Result<Vec<ContestRecord>, StoreError> {
        self.history.for_owner(owner).await
    }

    /// Drop every pending challenger and force the queue idle.
    pub async fn clear_queue(&self) -> Vec<EntryId> {
        self.queue.clear().await
    }

    /// Withdraw a challenger that has not started.
    pub async fn cancel(&self, entry_id: &EntryId) -> Result<(), AdmissionError> {
        self.queue.cancel(entry_id).await
    }

    /// Subscribe to ladder events.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }

    /// Resolve once no run is in flight and nothing is pending.
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await
    }

    /// Stop admitting, let the in-flight run finish, and stop the worker.
    pub async fn shutdown(&self) {
        self.queue.close().await;
        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(err) = worker.await {
                warn!("Queue worker ended abnormally: {}", err);
            }
        }
        info!("Ladder service stopped");
    }

    /// Dispatch one protocol request.
    pub async fn handle(&self, request: LadderRequest) -> LadderResponse {
        match request {
            LadderRequest::Submit { owner_id, artifact, entry_id } => {
                let challenger = match entry_id {
                    Some(entry_id) => Challenger::new(entry_id, owner_id, artifact),
                    None => match Challenger::from_file(owner_id, &artifact).await {
                        Ok(challenger) => challenger,
                        Err(err) => {
                            return LadderResponse::error(format!(
                                "cannot read artifact {}: {}",
                                artifact.display(),
                                err
                            ))
                        }
                    },
                };
                match self.submit(challenger).await {
                    Ok(receipt) => LadderResponse::Submitted(receipt),
                    Err(err) => LadderResponse::error(err),
                }
            }
            LadderRequest::QueueStatus => LadderResponse::QueueStatus(self.queue_status().await),
            LadderRequest::Ranking => match self.ranking().await {
                Ok(rows) => LadderResponse::Ranking { rows },
                Err(err) => LadderResponse::error(err),
            },
            LadderRequest::History { owner_id } => match self.history(&owner_id).await {
                Ok(records) => LadderResponse::History { owner_id, records },
                Err(err) => LadderResponse::error(err),
            },
            LadderRequest::ClearQueue => LadderResponse::QueueCleared {
                dropped: self.clear_queue().await,
            },
            LadderRequest::Cancel { entry_id } => match self.cancel(&entry_id).await {
                Ok(()) => LadderResponse::Cancelled { entry_id },
                Err(err) => LadderResponse::error(err),
            },
        }
    }
}
