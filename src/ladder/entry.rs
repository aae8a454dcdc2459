//! Ranking Snapshot
//!
//! The ladder itself: an ordered list of entries whose ranks are always a dense
//! `1..=N` permutation. All mutation goes through [`RankingSnapshot::apply_placement`],
//! which enforces the promotion rule (an owner's rank never worsens).

use std::path::PathBuf;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::core::ids::{Challenger, EntryId, OwnerId};
use crate::ladder::record::{ContestRecord, Tally};

// =============================================================================
// ENTRY
// =============================================================================

/// One ranked entry on the ladder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Entry identity.
    pub entry_id: EntryId,
    /// Owning account.
    pub owner_id: OwnerId,
    /// Current rank (1 = top).
    pub rank: u32,
    /// Contests won, replayed from history.
    pub wins: u32,
    /// Contests lost, replayed from history.
    pub losses: u32,
    /// Path to the agent the executor runs when this entry defends.
    pub artifact: PathBuf,
    /// Last time this entry was placed.
    pub last_updated: DateTime<Utc>,
}

impl Entry {
    /// Build an unranked entry for a challenger. Rank is assigned on insertion.
    pub fn for_challenger(challenger: &Challenger, now: DateTime<Utc>) -> Self {
        Self {
            entry_id: challenger.entry_id.clone(),
            owner_id: challenger.owner_id.clone(),
            rank: 0,
            wins: 0,
            losses: 0,
            artifact: challenger.artifact.clone(),
            last_updated: now,
        }
    }

    /// Fraction of decided contests won (0.0 when none are decided).
    pub fn win_rate(&self) -> f64 {
        let decided = self.wins + self.losses;
        if decided == 0 {
            0.0
        } else {
            self.wins as f64 / decided as f64
        }
    }
}

// =============================================================================
// PLACEMENT
// =============================================================================

/// Result of applying the promotion rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlacementOutcome {
    /// The challenger now sits at `rank`.
    Applied {
        /// New rank.
        rank: u32,
        /// Rank the owner held before, if any.
        previous: Option<u32>,
    },
    /// The owner already held an equal or better rank; nothing changed.
    Discarded {
        /// Rank the owner keeps.
        kept_rank: u32,
        /// Rank the run proposed.
        proposed_rank: u32,
    },
}

impl PlacementOutcome {
    /// The rank the owner holds after this placement.
    pub fn effective_rank(&self) -> u32 {
        match self {
            PlacementOutcome::Applied { rank, .. } => *rank,
            PlacementOutcome::Discarded { kept_rank, .. } => *kept_rank,
        }
    }
}

/// Why a snapshot is not a valid ladder.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    /// Ranks are not exactly `1..=N` in order.
    #[error("rank {found} at position {position}, expected {expected}")]
    RankGap {
        /// Zero-based position in the list.
        position: usize,
        /// Rank that should be there.
        expected: u32,
        /// Rank actually found.
        found: u32,
    },

    /// The same owner appears twice.
    #[error("owner {0} holds more than one entry")]
    DuplicateOwner(OwnerId),

    /// The same entry appears twice.
    #[error("entry {0} appears more than once")]
    DuplicateEntry(EntryId),
}

// =============================================================================
// RANKING SNAPSHOT
// =============================================================================

/// Ordered ladder, read and replaced as a whole.
///
/// Invariant: `entries[i].rank == i + 1` for every `i`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RankingSnapshot {
    entries: Vec<Entry>,
}

impl RankingSnapshot {
    /// Empty ladder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from entries already in rank order, validating density.
    pub fn from_entries(entries: Vec<Entry>) -> Result<Self, SnapshotError> {
        let snapshot = Self { entries };
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Build from entries in the given order, overwriting their ranks with `1..=N`.
    pub fn from_ordered(entries: Vec<Entry>) -> Self {
        let mut snapshot = Self { entries };
        snapshot.compact();
        snapshot
    }

    /// Number of ranked entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nobody is ranked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, rank 1 first.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Entry at a 1-based rank.
    pub fn entry_at(&self, rank: u32) -> Option<&Entry> {
        if rank == 0 {
            return None;
        }
        self.entries
            .get(rank as usize - 1)
            .filter(|e| e.rank == rank)
    }

    /// Entry held by an owner.
    pub fn entry_for_owner(&self, owner: &OwnerId) -> Option<&Entry> {
        self.entries.iter().find(|e| &e.owner_id == owner)
    }

    /// Rank held by an owner.
    pub fn rank_of_owner(&self, owner: &OwnerId) -> Option<u32> {
        self.entry_for_owner(owner).map(|e| e.rank)
    }

    /// Check the dense-rank and uniqueness invariants.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        let mut owners = std::collections::BTreeSet::new();
        let mut ids = std::collections::BTreeSet::new();

        for (position, entry) in self.entries.iter().enumerate() {
            let expected = position as u32 + 1;
            if entry.rank != expected {
                return Err(SnapshotError::RankGap {
                    position,
                    expected,
                    found: entry.rank,
                });
            }
            if !owners.insert(&entry.owner_id) {
                return Err(SnapshotError::DuplicateOwner(entry.owner_id.clone()));
            }
            if !ids.insert(&entry.entry_id) {
                return Err(SnapshotError::DuplicateEntry(entry.entry_id.clone()));
            }
        }

        Ok(())
    }

    /// Apply the promotion rule for `entry` at `rank`.
    ///
    /// If the owner already holds a rank at least as good, nothing changes.
    /// Otherwise the owner's stale entry is removed, everything at `rank` and
    /// below shifts down one place, and ranks are recompacted to `1..=N`.
    /// A `rank` past the bottom is clamped to `N + 1`.
    pub fn apply_placement(&mut self, mut entry: Entry, rank: u32) -> PlacementOutcome {
        let rank = rank.max(1);
        let previous = self.rank_of_owner(&entry.owner_id);

        if let Some(kept_rank) = previous {
            if rank >= kept_rank {
                return PlacementOutcome::Discarded {
                    kept_rank,
                    proposed_rank: rank,
                };
            }
        }

        // Prior entry sits below `rank`, so removing it leaves the slots above untouched.
        self.entries.retain(|e| e.owner_id != entry.owner_id);

        let index = (rank as usize - 1).min(self.entries.len());
        entry.rank = index as u32 + 1;
        self.entries.insert(index, entry);
        self.compact();

        PlacementOutcome::Applied {
            rank: index as u32 + 1,
            previous,
        }
    }

    /// Overwrite every entry's tallies by replaying the contest log.
    pub fn refresh_tallies(&mut self, history: &[ContestRecord]) {
        for entry in &mut self.entries {
            let tally = Tally::replay(history, &entry.owner_id);
            entry.wins = tally.wins;
            entry.losses = tally.losses;
        }
    }

    /// Reassign ranks `1..=N` in list order.
    fn compact(&mut self) {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.rank = i as u32 + 1;
        }
    }
}
