//! SHA-256 helpers.

use sha2::{Digest, Sha256};

/// SHA-256 over raw bytes.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-256 over raw bytes as a lowercase hex string.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// SHA-256 over a nonce followed by a payload.
///
/// Used by PoR proofs: binding a challenge-time nonce into the digest
/// proves the payload was read after the nonce existed.
pub fn sha256_with_nonce(nonce: &[u8], payload: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(nonce);
    hasher.update(payload);
    hasher.finalize().into()
}
