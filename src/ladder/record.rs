//! Contest Records
//!
//! Append-only log entries, one per resolved contest, plus the pure replay that
//! derives win/loss tallies from the log. Tallies are never kept as counters.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::core::ids::{EntryId, OwnerId};

/// Result of one contest, from the ladder's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContestOutcome {
    /// Challenger won more games.
    ChallengerWin,
    /// Defender won more games, or the contest could not be verified.
    DefenderWin,
    /// Equal game wins.
    Tie,
}

impl ContestOutcome {
    /// Decide the outcome from game tallies.
    pub fn from_tally(challenger_wins: u32, defender_wins: u32) -> Self {
        match challenger_wins.cmp(&defender_wins) {
            std::cmp::Ordering::Greater => ContestOutcome::ChallengerWin,
            std::cmp::Ordering::Less => ContestOutcome::DefenderWin,
            std::cmp::Ordering::Equal => ContestOutcome::Tie,
        }
    }

    /// Whether the challenger advances. Ties do not.
    pub fn challenger_advances(self) -> bool {
        self == ContestOutcome::ChallengerWin
    }
}

/// Who won a single game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameWinner {
    /// No winner.
    Draw,
    /// The challenger won.
    Challenger,
    /// The defender won.
    Defender,
}

impl GameWinner {
    /// Decode the executor's numeric winner code (0 draw, 1 challenger, 2 defender).
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(GameWinner::Draw),
            1 => Some(GameWinner::Challenger),
            2 => Some(GameWinner::Defender),
            _ => None,
        }
    }
}

/// Per-game detail reported by the executor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameDetail {
    /// 1-based game number.
    pub game: u32,
    /// Winner of this game.
    pub winner: GameWinner,
    /// Wall-clock duration in seconds.
    pub duration_secs: f64,
    /// Whether the challenger moved first.
    pub challenger_first: bool,
    /// Error raised while playing, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One resolved contest. Never mutated after it is appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContestRecord {
    /// Unique record id.
    pub id: Uuid,
    /// Challenging entry.
    pub challenger: EntryId,
    /// Owner of the challenging entry.
    pub challenger_owner: OwnerId,
    /// Defending entry; `None` for a baseline qualifier.
    pub defender: Option<EntryId>,
    /// Owner of the defending entry.
    pub defender_owner: Option<OwnerId>,
    /// Rank that was contested; `None` for a baseline qualifier.
    pub rank: Option<u32>,
    /// Contest result.
    pub outcome: ContestOutcome,
    /// Games won by the challenger.
    pub challenger_wins: u32,
    /// Games won by the defender.
    pub defender_wins: u32,
    /// Drawn games.
    pub draws: u32,
    /// Per-game detail (empty when execution failed).
    #[serde(default)]
    pub games: Vec<GameDetail>,
    /// When the contest resolved.
    pub timestamp: DateTime<Utc>,
    /// Execution error that forced the fail-safe defender win.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

impl ContestRecord {
    /// Whether this record was produced by the fail-safe path.
    pub fn is_fail_safe(&self) -> bool {
        self.diagnostics.is_some()
    }

    /// Whether `owner` took part on either side.
    pub fn involves(&self, owner: &OwnerId) -> bool {
        &self.challenger_owner == owner || self.defender_owner.as_ref() == Some(owner)
    }
}

/// Win/loss tallies for one owner, replayed from the contest log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    /// Contests won.
    pub wins: u32,
    /// Contests lost.
    pub losses: u32,
    /// Contests tied.
    pub ties: u32,
}

impl Tally {
    /// Replay the full log for `owner`.
    pub fn replay(history: &[ContestRecord], owner: &OwnerId) -> Self {
        history.iter().fold(Tally::default(), |mut tally, record| {
            let as_challenger = &record.challenger_owner == owner;
            let as_defender = record.defender_owner.as_ref() == Some(owner);

            // Own-entry contests are never scheduled; count them once if they appear.
            if as_challenger || as_defender {
                match (record.outcome, as_challenger) {
                    (ContestOutcome::Tie, _) => tally.ties += 1,
                    (ContestOutcome::ChallengerWin, true) | (ContestOutcome::DefenderWin, false) => {
                        tally.wins += 1
                    }
                    _ => tally.losses += 1,
                }
            }
            tally
        })
    }
}

/// Records involving `owner`, in log order.
pub fn history_for(history: &[ContestRecord], owner: &OwnerId) -> Vec<ContestRecord> {
    history
        .iter()
        .filter(|r| r.involves(owner))
        .cloned()
        .collect()
}
