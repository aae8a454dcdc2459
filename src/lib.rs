//! # Ladder Arena
//!
//! Single-ladder ranking engine. Submitted challengers wait in a FIFO queue,
//! then climb the ladder one head-to-head contest at a time against an
//! external match program.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       LADDER ARENA                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Identities                                │
//! │  ├── ids.rs      - OwnerId, EntryId, Challenger              │
//! │  └── hash.rs     - Content-addressed entry ids               │
//! │                                                              │
//! │  ladder/         - Ranking logic                             │
//! │  ├── entry.rs    - Entries and the dense ranking snapshot    │
//! │  ├── record.rs   - Contest records and tally replay          │
//! │  ├── updater.rs  - The climb (one run per challenger)        │
//! │  ├── queue.rs    - FIFO challenge queue, single runner       │
//! │  └── events.rs   - Broadcast ladder events                   │
//! │                                                              │
//! │  executor/       - Contest resolution                        │
//! │  ├── process.rs  - External match program (JSON report)      │
//! │  └── scripted.rs - Deterministic in-process executor         │
//! │                                                              │
//! │  store/          - Persistence                               │
//! │  ├── memory.rs   - In-memory stores                          │
//! │  └── json_file.rs- JSON files with atomic replace            │
//! │                                                              │
//! │  service/        - Facade and control protocol               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ladder Guarantees
//!
//! - Ranks are always exactly `1..=N` with no gaps or duplicates
//! - An owner's rank never gets worse through one of its own runs
//! - At most one run is in flight; runs resolve in admission order
//! - Win/loss tallies are replayed from the contest log, never counted
//! - A failed or timed-out contest is a defender win

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod config;
pub mod executor;
pub mod ladder;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use core::ids::{Challenger, EntryId, OwnerId};
pub use config::{ConfigError, LadderConfig};
pub use executor::{ContestVerdict, ContestantRef, ExecutionError, MatchExecutor, ProcessExecutor, ScriptedExecutor};
pub use ladder::{
    AdmissionError, ContestOutcome, ContestRecord, Entry, LadderEvent, QueueStatus, RankingSnapshot,
    RunResult, RunSummary,
};
pub use service::{LadderRequest, LadderResponse, LadderService, RankingRow, SubmitReceipt};
pub use store::{HistoryStore, RankingStore, StoreError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
