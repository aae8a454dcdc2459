//! Persistence Collaborators
//!
//! The ladder reads and atomically replaces a [`RankingSnapshot`], and appends
//! to an ordered [`ContestRecord`] log. Backends decide how that is stored.
//!
//! - `memory`: in-process stores for tests and dry runs
//! - `json_file`: pretty-printed JSON files replaced via rename

pub mod memory;
pub mod json_file;

use async_trait::async_trait;

use crate::core::ids::OwnerId;
use crate::ladder::entry::{RankingSnapshot, SnapshotError};
use crate::ladder::record::{history_for, ContestRecord};

pub use memory::{MemoryRankingStore, MemoryHistoryStore};
pub use json_file::{JsonRankingStore, JsonHistoryStore};

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored ranking violates the ladder invariants.
    #[error("corrupt ranking: {0}")]
    Corrupt(#[from] SnapshotError),
}

/// Durable ordered ranking. Readers never observe a partial write.
#[async_trait]
pub trait RankingStore: Send + Sync {
    /// Read the whole ladder.
    async fn load(&self) -> Result<RankingSnapshot, StoreError>;

    /// Atomically replace the whole ladder.
    async fn replace(&self, snapshot: &RankingSnapshot) -> Result<(), StoreError>;
}

/// Append-only contest log.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append one record at the end of the log.
    async fn append(&self, record: &ContestRecord) -> Result<(), StoreError>;

    /// The full log, oldest first.
    async fn all(&self) -> Result<Vec<ContestRecord>, StoreError>;

    /// Records where `owner` is on either side, oldest first.
    async fn for_owner(&self, owner: &OwnerId) -> Result<Vec<ContestRecord>, StoreError> {
        let all = self.all().await?;
        Ok(history_for(&all, owner))
    }
}
