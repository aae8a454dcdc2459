//! Ladder logic: ranking snapshot, contest records, the climb and the queue.
//!
//! `entry` and `record` are pure data with no I/O. `updater` drives a single
//! challenger's climb against the stores, and `queue` serializes climbs.

pub mod entry;
pub mod record;
pub mod events;
pub mod updater;
pub mod queue;

pub use entry::{Entry, PlacementOutcome, RankingSnapshot, SnapshotError};
pub use record::{ContestOutcome, ContestRecord, GameDetail, GameWinner, Tally};
pub use events::{EventBus, EventEnvelope, LadderEvent};
pub use updater::{starting_rank, LadderUpdater, RunError, RunResult, RunSummary};
pub use queue::{AdmissionError, ChallengeQueue, QueueStatus};
