//! In-memory stores.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::ladder::entry::RankingSnapshot;
use crate::ladder::record::ContestRecord;
use crate::store::{HistoryStore, RankingStore, StoreError};

/// Ranking kept in memory.
#[derive(Debug, Default)]
pub struct MemoryRankingStore {
    snapshot: RwLock<RankingSnapshot>,
}

impl MemoryRankingStore {
    /// Empty ladder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing ladder.
    pub fn with_snapshot(snapshot: RankingSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
        }
    }
}

#[async_trait]
impl RankingStore for MemoryRankingStore {
    async fn load(&self) -> Result<RankingSnapshot, StoreError> {
        Ok(self.snapshot.read().await.clone())
    }

    async fn replace(&self, snapshot: &RankingSnapshot) -> Result<(), StoreError> {
        snapshot.validate()?;
        *self.snapshot.write().await = snapshot.clone();
        Ok(())
    }
}

/// Contest log kept in memory.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    records: RwLock<Vec<ContestRecord>>,
}

impl MemoryHistoryStore {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(&self, record: &ContestRecord) -> Result<(), StoreError> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn all(&self) -> Result<Vec<ContestRecord>, StoreError> {
        Ok(self.records.read().await.clone())
    }
}
