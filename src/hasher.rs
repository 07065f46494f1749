//! Content fingerprinting.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 fingerprint of captured content as lowercase hex
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
