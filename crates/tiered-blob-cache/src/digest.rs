//! Key-to-filename digests

use sha2::{Digest, Sha256};

/// Maps a cache key to a filesystem-safe file name.
///
/// Implementations must be deterministic; distinct keys mapping to the
/// same name silently alias each other.
pub trait KeyDigest: Send + Sync {
    fn digest(&self, key: &str) -> String;
}

/// Default digest: SHA-256 of the key, hex-encoded
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256KeyDigest;

impl KeyDigest for Sha256KeyDigest {
    fn digest(&self, key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_generation() {
        let digest = Sha256KeyDigest;
        let name1 = digest.digest("https://example.com/image.jpg");
        let name2 = digest.digest("https://example.com/image.jpg");
        let name3 = digest.digest("https://example.com/other.jpg");

        // Same inputs produce same name
        assert_eq!(name1, name2);

        // Different inputs produce different names
        assert_ne!(name1, name3);

        // Names are hex strings (64 chars for SHA256)
        assert_eq!(name1.len(), 64);
        assert!(name1.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
