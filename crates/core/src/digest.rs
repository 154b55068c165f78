//! Content digests
//!
//! Artifact payload digests are rendered `algorithm:hex`, e.g.
//! `sha256:9f86d0…`. The repository digests every payload on ingest.

use sha2::{Digest, Sha256};

/// Algorithm tag used in rendered digests.
pub const DIGEST_ALGORITHM: &str = "sha256";

/// Incremental SHA-256 digest plus byte count over a payload stream.
pub struct DigestComputer {
    hasher: Sha256,
    length: u64,
}

impl DigestComputer {
    /// Start a fresh digest.
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
            length: 0,
        }
    }

    /// Feed a chunk of payload bytes.
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.length += chunk.len() as u64;
    }

    /// Finish, returning `(rendered digest, byte count)`.
    pub fn finish(self) -> (String, u64) {
        let digest = self.hasher.finalize();
        (
            format!("{}:{}", DIGEST_ALGORITHM, hex::encode(digest)),
            self.length,
        )
    }
}

impl Default for DigestComputer {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot digest of an in-memory payload.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut computer = DigestComputer::new();
    computer.update(data);
    computer.finish().0
}
