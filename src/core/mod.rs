//! Core primitives: identities and artifact hashing.

pub mod hash;
pub mod ids;

// Re-export core types
pub use hash::{artifact_digest, short_hex, ArtifactDigest, ArtifactHasher};
pub use ids::{Challenger, EntryId, OwnerId};
