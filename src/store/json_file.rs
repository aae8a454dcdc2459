//! JSON File Stores
//!
//! Each store owns one pretty-printed JSON file. Writes go to a sibling
//! `.tmp` file that is fsynced and renamed over the target, so readers see
//! either the old or the new content, never a torn file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::ladder::entry::RankingSnapshot;
use crate::ladder::record::ContestRecord;
use crate::store::{HistoryStore, RankingStore, StoreError};

/// Default ranking file name inside the data directory.
pub const RANKING_FILE: &str = "ranking.json";

/// Default history file name inside the data directory.
pub const HISTORY_FILE: &str = "history.json";

/// Read a JSON file, treating a missing file as `T::default()`.
async fn read_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(T::default()),
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

/// Write-to-temp then rename.
async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(&bytes).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

// =============================================================================
// RANKING
// =============================================================================

/// Ranking persisted as a JSON array, rank 1 first.
#[derive(Debug)]
pub struct JsonRankingStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonRankingStore {
    /// Store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store at `<dir>/ranking.json`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(RANKING_FILE))
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RankingStore for JsonRankingStore {
    async fn load(&self) -> Result<RankingSnapshot, StoreError> {
        let snapshot: RankingSnapshot = read_json(&self.path).await?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    async fn replace(&self, snapshot: &RankingSnapshot) -> Result<(), StoreError> {
        snapshot.validate()?;
        let _guard = self.write_lock.lock().await;
        write_json_atomic(&self.path, snapshot).await
    }
}

// =============================================================================
// HISTORY
// =============================================================================

/// Contest log persisted as a JSON array, oldest first.
#[derive(Debug)]
pub struct JsonHistoryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonHistoryStore {
    /// Store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store at `<dir>/history.json`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(HISTORY_FILE))
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistoryStore for JsonHistoryStore {
    async fn append(&self, record: &ContestRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut records: Vec<ContestRecord> = read_json(&self.path).await?;
        records.push(record.clone());
        write_json_atomic(&self.path, &records).await
    }

    async fn all(&self) -> Result<Vec<ContestRecord>, StoreError> {
        read_json(&self.path).await
    }
}
