//! Challenge Queue
//!
//! FIFO admission for ladder runs. Exactly one worker task drains the queue,
//! so at most one run is ever in flight. Admission, withdrawal and status
//! reads go through one mutex-guarded state.
//!
//! ```text
//!            enqueue (idle)              run terminal, queue empty
//!   Idle ─────────────────────▶ Busy ─────────────────────────────▶ Idle
//!                                 │ ▲
//!                                 └─┘ run terminal, queue non-empty
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tokio::sync::{broadcast, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{info, error, debug};

use crate::core::ids::{Challenger, EntryId};
use crate::ladder::events::{EventBus, LadderEvent};
use crate::ladder::updater::{LadderUpdater, RunError};

/// Admission errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// The challenger is already waiting.
    #[error("{entry_id} is already queued at position {position}")]
    DuplicateAdmission {
        /// Duplicate entry.
        entry_id: EntryId,
        /// Its existing 1-based position.
        position: usize,
    },

    /// The challenger is not waiting (never queued, already started, or finished).
    #[error("{0} is not pending")]
    NotPending(EntryId),

    /// The queue no longer accepts work.
    #[error("challenge queue is shutting down")]
    ShuttingDown,
}

/// Read-only view of the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Waiting challengers, head first.
    pub pending: Vec<EntryId>,
    /// Whether a run is in flight or the worker has been woken for the head.
    /// Always true while `pending` is non-empty, unless the queue was just cleared.
    pub busy: bool,
    /// Challenger whose run is in flight.
    pub current: Option<EntryId>,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Challenger>,
    busy: bool,
    current: Option<EntryId>,
    closed: bool,
}

impl QueueState {
    fn position_of(&self, entry_id: &EntryId) -> Option<usize> {
        self.pending
            .iter()
            .position(|c| &c.entry_id == entry_id)
            .map(|i| i + 1)
    }

    fn is_settled(&self) -> bool {
        self.current.is_none() && self.pending.is_empty()
    }
}

/// Single-runner FIFO scheduler.
pub struct ChallengeQueue {
    state: Mutex<QueueState>,
    wake: Notify,
    settled: watch::Sender<bool>,
    shutdown_tx: broadcast::Sender<()>,
    events: EventBus,
}

impl ChallengeQueue {
    /// Create an idle, empty queue.
    pub fn new(events: EventBus) -> Arc<Self> {
        let (settled, _) = watch::channel(true);
        let (shutdown_tx, _) = broadcast::channel(1);

        Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            wake: Notify::new(),
            settled,
            shutdown_tx,
            events,
        })
    }

    /// Append a challenger. Returns its 1-based position.
    pub async fn enqueue(&self, challenger: Challenger) -> Result<usize, AdmissionError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(AdmissionError::ShuttingDown);
        }

        if let Some(position) = state.position_of(&challenger.entry_id) {
            return Err(AdmissionError::DuplicateAdmission {
                entry_id: challenger.entry_id,
                position,
            });
        }

        let entry_id = challenger.entry_id.clone();
        state.pending.push_back(challenger);
        let position = state.pending.len();
        self.settled.send_replace(false);

        // Busy from the moment the worker is woken, so status never shows idle with waiters.
        if !state.busy {
            state.busy = true;
            self.wake.notify_one();
        }
        drop(state);

        debug!("Queued {} at position {}", entry_id, position);
        self.events.publish(LadderEvent::Admitted { entry_id, position });
        Ok(position)
    }

    /// Pop the head and mark the queue busy. An empty queue goes idle and returns `None`.
    pub async fn dequeue_head(&self) -> Option<Challenger> {
        let mut state = self.state.lock().await;
        if state.closed {
            return None;
        }

        match state.pending.pop_front() {
            Some(challenger) => {
                state.busy = true;
                state.current = Some(challenger.entry_id.clone());
                Some(challenger)
            }
            None => {
                state.busy = false;
                if state.is_settled() {
                    self.settled.send_replace(true);
                }
                None
            }
        }
    }

    /// Current pending sequence and busy flag.
    pub async fn status(&self) -> QueueStatus {
        let state = self.state.lock().await;
        QueueStatus {
            pending: state.pending.iter().map(|c| c.entry_id.clone()).collect(),
            busy: state.busy,
            current: state.current.clone(),
        }
    }

    /// Withdraw a challenger that has not started yet.
    pub async fn cancel(&self, entry_id: &EntryId) -> Result<(), AdmissionError> {
        let mut state = self.state.lock().await;
        let index = state
            .pending
            .iter()
            .position(|c| &c.entry_id == entry_id)
            .ok_or_else(|| AdmissionError::NotPending(entry_id.clone()))?;
        state.pending.remove(index);
        if state.is_settled() {
            state.busy = false;
            self.settled.send_replace(true);
        }
        drop(state);

        debug!("Withdrew {}", entry_id);
        self.events.publish(LadderEvent::Withdrawn {
            entry_id: entry_id.clone(),
        });
        Ok(())
    }

    /// Drop every waiter and force the idle flag. An in-flight run keeps going.
    pub async fn clear(&self) -> Vec<EntryId> {
        let mut state = self.state.lock().await;
        let dropped: Vec<EntryId> = state.pending.drain(..).map(|c| c.entry_id).collect();
        state.busy = false;
        if state.is_settled() {
            self.settled.send_replace(true);
        }
        drop(state);

        info!("Cleared {} pending challengers", dropped.len());
        self.events.publish(LadderEvent::QueueCleared {
            dropped: dropped.clone(),
        });
        dropped
    }

    /// Resolve once no run is in flight and nothing is pending.
    pub async fn wait_idle(&self) {
        let mut rx = self.settled.subscribe();
        // The sender lives as long as `self`, so this cannot fail while borrowed.
        let _ = rx.wait_for(|settled| *settled).await;
    }

    /// Stop accepting work. The in-flight run finishes; waiters are not started.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        state.pending.clear();
        state.busy = state.current.is_some();
        if state.is_settled() {
            self.settled.send_replace(true);
        }
        drop(state);
        let _ = self.shutdown_tx.send(());
    }

    /// Release the run slot after a terminal state.
    async fn finish_run(&self) {
        let mut state = self.state.lock().await;
        state.current = None;
        if state.pending.is_empty() {
            state.busy = false;
            self.settled.send_replace(true);
        }
    }

    /// Spawn the single worker that drains the queue through `updater`.
    pub fn spawn_worker(self: &Arc<Self>, updater: Arc<LadderUpdater>) -> JoinHandle<()> {
        let queue = self.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = queue.wake.notified() => {}
                    _ = shutdown_rx.recv() => {
                        info!("Challenge queue worker stopping");
                        break;
                    }
                }

                while let Some(challenger) = queue.dequeue_head().await {
                    queue.execute(&updater, challenger).await;
                }
            }
        })
    }

    /// Run one challenger to a terminal state. Never leaves the queue busy.
    async fn execute(&self, updater: &Arc<LadderUpdater>, challenger: Challenger) {
        let entry_id = challenger.entry_id.clone();
        let task_updater = updater.clone();

        // A panic inside the run surfaces as a JoinError instead of killing the worker.
        let outcome = tokio::spawn(async move { task_updater.run(&challenger).await })
            .await
            .unwrap_or_else(|join_err| Err(RunError::Panicked(join_err.to_string())));

        if let Err(err) = outcome {
            error!("Ladder run for {} failed: {}", entry_id, err);
            self.events.publish(LadderEvent::RunFailed {
                entry_id,
                error: err.to_string(),
            });
        }

        self.finish_run().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenger(id: &str) -> Challenger {
        Challenger::new(id.into(), id.into(), format!("{id}.py"))
    }

    #[tokio::test]
    async fn test_enqueue_positions() {
        let queue = ChallengeQueue::new(EventBus::default());
        assert_eq!(queue.enqueue(challenger("a")).await, Ok(1));
        assert_eq!(queue.enqueue(challenger("b")).await, Ok(2));

        let status = queue.status().await;
        assert_eq!(status.pending, vec![EntryId::new("a"), EntryId::new("b")]);
        assert!(status.current.is_none());
    }

    #[tokio::test]
    async fn test_waiters_never_look_idle() {
        let queue = ChallengeQueue::new(EventBus::default());
        queue.enqueue(challenger("a")).await.unwrap();

        let status = queue.status().await;
        assert_eq!(status.pending.len(), 1);
        assert!(status.busy);

        queue.dequeue_head().await.unwrap();
        queue.finish_run().await;
        assert!(queue.dequeue_head().await.is_none());
        assert!(!queue.status().await.busy);
    }

    #[tokio::test]
    async fn test_duplicate_admission() {
        let queue = ChallengeQueue::new(EventBus::default());
        queue.enqueue(challenger("a")).await.unwrap();
        queue.enqueue(challenger("b")).await.unwrap();

        let result = queue.enqueue(challenger("a")).await;
        assert_eq!(
            result,
            Err(AdmissionError::DuplicateAdmission { entry_id: "a".into(), position: 1 })
        );
        assert_eq!(queue.status().await.pending.len(), 2);
    }

    #[tokio::test]
    async fn test_dequeue_transitions() {
        let queue = ChallengeQueue::new(EventBus::default());
        queue.enqueue(challenger("a")).await.unwrap();

        let head = queue.dequeue_head().await.unwrap();
        assert_eq!(head.entry_id.as_str(), "a");
        let status = queue.status().await;
        assert!(status.busy);
        assert_eq!(status.current, Some("a".into()));

        queue.finish_run().await;
        assert!(queue.dequeue_head().await.is_none());
        assert!(!queue.status().await.busy);
    }

    #[tokio::test]
    async fn test_cancel_pending_only() {
        let queue = ChallengeQueue::new(EventBus::default());
        queue.enqueue(challenger("a")).await.unwrap();
        queue.enqueue(challenger("b")).await.unwrap();

        queue.dequeue_head().await.unwrap();
        assert_eq!(
            queue.cancel(&"a".into()).await,
            Err(AdmissionError::NotPending("a".into()))
        );
        assert_eq!(queue.cancel(&"b".into()).await, Ok(()));
        assert!(queue.status().await.pending.is_empty());
        assert!(queue.status().await.busy);

        queue.finish_run().await;
        queue.enqueue(challenger("c")).await.unwrap();
        queue.cancel(&"c".into()).await.unwrap();
        assert!(!queue.status().await.busy);
    }

    #[tokio::test]
    async fn test_clear_forces_idle() {
        let queue = ChallengeQueue::new(EventBus::default());
        queue.enqueue(challenger("a")).await.unwrap();
        queue.enqueue(challenger("b")).await.unwrap();
        queue.dequeue_head().await.unwrap();

        let dropped = queue.clear().await;
        assert_eq!(dropped, vec![EntryId::new("b")]);

        let status = queue.status().await;
        assert!(status.pending.is_empty());
        assert!(!status.busy);
        assert_eq!(status.current, Some("a".into()));
    }

    #[tokio::test]
    async fn test_closed_queue_rejects() {
        let queue = ChallengeQueue::new(EventBus::default());
        queue.close().await;
        assert_eq!(queue.enqueue(challenger("a")).await, Err(AdmissionError::ShuttingDown));
        queue.wait_idle().await;
    }
}
