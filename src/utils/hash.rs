//! Content hashing utilities.
//!
//! The diff engine treats equal hashes as a fast equality proxy for
//! subtree content, not a cryptographic guarantee. Any deterministic
//! 64-bit hash works; both documents of a run must use the same one.

use xxhash_rust::xxh3::xxh3_64;

/// Compute a content hash for a string.
pub fn content_hash(text: &str) -> u64 {
    xxh3_64(text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_deterministic() {
        let hash = content_hash("library");
        assert_eq!(hash, content_hash("library"));
        assert_ne!(hash, content_hash("Library"));
    }
}
