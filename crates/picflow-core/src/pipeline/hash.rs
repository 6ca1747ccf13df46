//! Content hashes used for artifact identity and rename tokens.

use sha2::{Digest, Sha256};

/// BLAKE3 hex digest, used as the artifact content hash.
pub fn content_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// MD5 hex digest (32 chars).
pub fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// SHA-256 hex digest (64 chars).
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
