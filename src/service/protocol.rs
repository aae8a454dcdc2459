//! Control Protocol
//!
//! Request/response messages for driving a ladder from outside the process.
//! Every message is a JSON object tagged by `type`, one per line on the wire.

use std::path::PathBuf;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::core::ids::{EntryId, OwnerId};
use crate::ladder::entry::Entry;
use crate::ladder::queue::QueueStatus;
use crate::ladder::record::ContestRecord;

// =============================================================================
// REQUESTS
// =============================================================================

/// Requests accepted by the ladder service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LadderRequest {
    /// Admit a challenger. Without `entry_id` the id is derived from the artifact bytes.
    Submit {
        /// Submitting owner.
        owner_id: OwnerId,
        /// Path to the challenger's artifact.
        artifact: PathBuf,
        /// Explicit entry id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entry_id: Option<EntryId>,
    },

    /// Pending sequence and busy flag.
    QueueStatus,

    /// Current ranking, best first.
    Ranking,

    /// Contests involving one owner.
    History {
        /// Owner to look up.
        owner_id: OwnerId,
    },

    /// Drop every pending challenger.
    ClearQueue,

    /// Withdraw one pending challenger.
    Cancel {
        /// Entry to withdraw.
        entry_id: EntryId,
    },
}

impl LadderRequest {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

// =============================================================================
// RESPONSES
// =============================================================================

/// Result of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    /// Submitted entry.
    pub entry_id: EntryId,
    /// False when the entry was already pending.
    pub accepted: bool,
    /// 1-based position among pending challengers.
    pub queue_position: usize,
}

/// One row of the public ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingRow {
    /// 1-based rank.
    pub rank: u32,
    /// Ranked entry.
    pub entry_id: EntryId,
    /// Its owner.
    pub owner_id: OwnerId,
    /// Contests won.
    pub wins: u32,
    /// Contests lost.
    pub losses: u32,
    /// `wins / (wins + losses)`, 0.0 with no decided contests.
    pub win_rate: f64,
    /// Last placement time.
    pub last_updated: DateTime<Utc>,
}

impl From<&Entry> for RankingRow {
    fn from(entry: &Entry) -> Self {
        Self {
            rank: entry.rank,
            entry_id: entry.entry_id.clone(),
            owner_id: entry.owner_id.clone(),
            wins: entry.wins,
            losses: entry.losses,
            win_rate: entry.win_rate(),
            last_updated: entry.last_updated,
        }
    }
}

/// Responses produced by the ladder service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LadderResponse {
    /// Submission handled.
    Submitted(SubmitReceipt),

    /// Queue snapshot.
    QueueStatus(QueueStatus),

    /// Ranking rows, best first.
    Ranking {
        /// Rows.
        rows: Vec<RankingRow>,
    },

    /// History for one owner.
    History {
        /// Owner.
        owner_id: OwnerId,
        /// Records in log order.
        records: Vec<ContestRecord>,
    },

    /// Queue emptied.
    QueueCleared {
        /// Challengers that were dropped.
        dropped: Vec<EntryId>,
    },

    /// Pending challenger withdrawn.
    Cancelled {
        /// Withdrawn entry.
        entry_id: EntryId,
    },

    /// Request failed.
    Error {
        /// Human-readable message.
        message: String,
    },
}

impl LadderResponse {
    /// Error response from anything displayable.
    pub fn error(err: impl std::fmt::Display) -> Self {
        LadderResponse::Error {
            message: err.to_string(),
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
