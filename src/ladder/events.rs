//! Ladder Events
//!
//! Published on a broadcast channel for observers (logs, dashboards, tests).
//! Run failures are reported here; nothing retries them.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use tokio::sync::broadcast;

use crate::core::ids::{EntryId, OwnerId};
use crate::ladder::record::ContestRecord;
use crate::ladder::updater::RunResult;

/// Something that happened on the ladder.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LadderEvent {
    /// Challenger joined the queue.
    Admitted {
        /// Admitted entry.
        entry_id: EntryId,
        /// 1-based position among waiters.
        position: usize,
    },

    /// A pending challenger was withdrawn.
    Withdrawn {
        /// Withdrawn entry.
        entry_id: EntryId,
    },

    /// The pending sequence was cleared.
    QueueCleared {
        /// Challengers dropped.
        dropped: Vec<EntryId>,
    },

    /// A ladder run began.
    RunStarted {
        /// Climbing entry.
        entry_id: EntryId,
        /// Its owner.
        owner_id: OwnerId,
    },

    /// A contest resolved and was appended to history.
    ContestResolved(Box<ContestRecord>),

    /// A ladder run reached its terminal state.
    RunFinished {
        /// Climbing entry.
        entry_id: EntryId,
        /// How the run ended.
        result: RunResult,
        /// Contests played in this run.
        contests: usize,
    },

    /// A ladder run aborted without placing the challenger.
    RunFailed {
        /// Climbing entry.
        entry_id: EntryId,
        /// Error description.
        error: String,
    },
}

/// Timestamped event envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// When the event was published.
    pub at: DateTime<Utc>,
    /// The event.
    #[serde(flatten)]
    pub event: LadderEvent,
}

/// Broadcast fan-out for ladder events.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Bus buffering `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Having no subscribers is fine.
    pub fn publish(&self, event: LadderEvent) {
        let _ = self.tx.send(EventEnvelope {
            at: Utc::now(),
            event,
        });
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
