//! SHA-256 digests for verifying scene uploads.

use sha2::{Digest, Sha256};

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Incremental SHA-256 over a stream of chunks.
#[derive(Debug, Clone, Default)]
pub struct StreamDigest {
    hasher: Sha256,
}

impl StreamDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    /// Hex digest of everything fed so far.
    pub fn finish(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_produces_known_hash() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn streamed_digest_matches_one_shot() {
        let mut digest = StreamDigest::new();
        for chunk in [&b"hello"[..], b" ", b"world"] {
            digest.update(chunk);
        }
        assert_eq!(digest.finish(), sha256_hex(b"hello world"));
    }
}
