//! Identity Types
//!
//! String newtypes for owners and ladder entries.
//! Both implement `Ord` so state can be kept in `BTreeMap`s with stable iteration.

use std::fmt;
use std::path::{Path, PathBuf};
use serde::{Serialize, Deserialize};

use crate::core::hash::{artifact_digest, short_hex};

// =============================================================================
// OWNER ID
// =============================================================================

/// Identity of the account that submitted an entry.
///
/// An owner holds at most one entry on the ladder at a time.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Create from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// =============================================================================
// ENTRY ID
// =============================================================================

/// Identity of one submitted entry (one version of an owner's agent).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Create from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive a content-addressed id from the owner and artifact bytes.
    pub fn from_artifact(owner: &OwnerId, artifact: &[u8]) -> Self {
        let digest = artifact_digest(owner.as_str(), artifact);
        Self(short_hex(&digest))
    }

    /// Borrow as `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// =============================================================================
// CHALLENGER
// =============================================================================

/// A candidate admitted to the challenge queue.
///
/// Queue identity is `entry_id`; `artifact` is what the match executor runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenger {
    /// Entry identity.
    pub entry_id: EntryId,
    /// Owning account.
    pub owner_id: OwnerId,
    /// Path to the submitted agent.
    pub artifact: PathBuf,
}

impl Challenger {
    /// Create a challenger.
    pub fn new(entry_id: EntryId, owner_id: OwnerId, artifact: impl Into<PathBuf>) -> Self {
        Self {
            entry_id,
            owner_id,
            artifact: artifact.into(),
        }
    }

    /// Read the artifact from disk and derive a content-addressed entry id.
    pub async fn from_file(owner_id: OwnerId, artifact: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = artifact.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let entry_id = EntryId::from_artifact(&owner_id, &bytes);
        Ok(Self::new(entry_id, owner_id, path))
    }
}
