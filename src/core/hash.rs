//! Artifact Hashing
//!
//! Content-addressed identifiers for submitted artifacts.
//! Identical code uploaded twice by the same owner hashes to the same entry id,
//! which lets the challenge queue reject the duplicate admission.

use sha2::{Sha256, Digest};

/// Digest output type (256 bits / 32 bytes)
pub type ArtifactDigest = [u8; 32];

/// Number of digest bytes kept in an entry id (16 hex characters).
pub const ENTRY_ID_BYTES: usize = 8;

/// Domain-separated SHA-256 hasher.
///
/// Fields are length-prefixed so that `("ab", "c")` and `("a", "bc")`
/// never collide.
pub struct ArtifactHasher {
    hasher: Sha256,
}

impl ArtifactHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for ladder entries.
    pub fn for_entry() -> Self {
        Self::new(b"ladder-entry:")
    }

    /// Update with a length-prefixed field.
    #[inline]
    pub fn update_field(&mut self, bytes: &[u8]) {
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
    }

    /// Finalize and return the digest.
    pub fn finalize(self) -> ArtifactDigest {
        self.hasher.finalize().into()
    }
}

/// Digest an owner's artifact bytes.
pub fn artifact_digest(owner: &str, artifact: &[u8]) -> ArtifactDigest {
    let mut hasher = ArtifactHasher::for_entry();
    hasher.update_field(owner.as_bytes());
    hasher.update_field(artifact);
    hasher.finalize()
}

/// Short hex form of a digest, as used in entry ids.
pub fn short_hex(digest: &ArtifactDigest) -> String {
    hex::encode(&digest[..ENTRY_ID_BYTES])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_deterministic() {
        let a = artifact_digest("alice", b"class Search: pass");
        let b = artifact_digest("alice", b"class Search: pass");
        assert_eq!(a, b);
    }

    #[test]
    fn test_digest_depends_on_owner() {
        let a = artifact_digest("alice", b"same code");
        let b = artifact_digest("bob", b"same code");
        assert_ne!(a, b);
    }

    #[test]
    fn test_field_boundaries_do_not_collide() {
        let a = artifact_digest("ab", b"c");
        let b = artifact_digest("a", b"bc");
        assert_ne!(a, b);
    }

    #[test]
    fn test_short_hex_length() {
        let digest = artifact_digest("alice", b"x");
        assert_eq!(short_hex(&digest).len(), ENTRY_ID_BYTES * 2);
    }
}
