//! The canonical serialization-and-hash contract.
//!
//! Every record that is signed (requests, policy, manifest, audit entries,
//! tickets, usage records, challenges, heartbeats, checkpoints) has exactly
//! one signing view: a struct whose fields are declared in the normative
//! order, with repeated string fields pre-sorted ascending by byte value and
//! optional fields present with zero/empty defaults. The view is serialized
//! to compact JSON and hashed with SHA-256; the lowercase hex digest is what
//! signatures cover. Both principals must reproduce these bytes bit-exactly,
//! which is why views are explicit ordered structs rather than ambient map
//! ordering.

use crate::error::CodecError;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Serializes a signing view into its canonical byte representation.
///
/// `serde_json` emits struct fields in declaration order, so the byte layout
/// is fixed by the view definition alone.
pub fn to_canonical_bytes<T: Serialize>(view: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(view).map_err(|e| CodecError::Serialize(e.to_string()))
}

/// Hashes a signing view, returning the lowercase hex SHA-256 digest.
pub fn hash_view<T: Serialize>(view: &T) -> Result<String, CodecError> {
    let bytes = to_canonical_bytes(view)?;
    Ok(sha256_hex(&bytes))
}

/// SHA-256 over raw bytes, returned as a lowercase hex string.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// SHA-256 over raw bytes, returned as the 32-byte digest.
pub fn sha256_bytes(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

/// Returns a copy of `items` sorted ascending by byte value.
///
/// Used by every signing view that carries a repeated string field; the
/// on-wire order of `paths` or `snapshot_ids` must never change the hash.
pub fn sorted(items: &[String]) -> Vec<String> {
    let mut out = items.to_vec();
    out.sort();
    out
}
