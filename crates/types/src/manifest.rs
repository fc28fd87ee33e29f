//! The signed, Merkle-rooted registry of all snapshots known to exist.

use crate::canonical::{self, hash_view, sha256_bytes};
use crate::error::CodecError;
use serde::{Deserialize, Serialize};

/// One snapshot as reported by the external backup engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Opaque snapshot id assigned by the backup engine.
    pub id: String,
    /// Unix seconds at which the snapshot was taken.
    pub created_at: i64,
    /// Paths captured by the snapshot.
    pub paths: Vec<String>,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Snapshot size in bytes.
    pub size: u64,
    /// Content tree hash reported by the backup engine.
    pub tree_hash: String,
}

/// The Owner-signed manifest of all known snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Format version.
    pub version: u32,
    /// Id of the policy this manifest operates under.
    pub policy_id: String,
    /// Stable key id of the signing Owner.
    pub owner_id: String,
    /// Unix seconds at creation.
    pub created_at: i64,
    /// Unix seconds of the last mutation.
    pub updated_at: i64,
    /// Snapshot entries in append order.
    pub snapshots: Vec<SnapshotEntry>,
    /// Merkle root over the sorted snapshot id set.
    pub merkle_root: String,
    /// Owner signature over the canonical hash, empty until signed.
    #[serde(default)]
    pub owner_signature: String,
}

#[derive(Serialize)]
struct SnapshotEntryView<'a> {
    id: &'a str,
    created_at: i64,
    paths: Vec<String>,
    tags: Vec<String>,
    size: u64,
    tree_hash: &'a str,
}

#[derive(Serialize)]
struct ManifestSigningView<'a> {
    version: u32,
    policy_id: &'a str,
    owner_id: &'a str,
    created_at: i64,
    updated_at: i64,
    merkle_root: &'a str,
    snapshots: Vec<SnapshotEntryView<'a>>,
}

impl Manifest {
    /// The canonical hash the Owner signs, excluding the signature field.
    ///
    /// Snapshot entries are sorted by id so that insertion order never
    /// changes the hash.
    pub fn signing_hash(&self) -> Result<String, CodecError> {
        let mut entries: Vec<&SnapshotEntry> = self.snapshots.iter().collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        hash_view(&ManifestSigningView {
            version: self.version,
            policy_id: &self.policy_id,
            owner_id: &self.owner_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            merkle_root: &self.merkle_root,
            snapshots: entries
                .into_iter()
                .map(|s| SnapshotEntryView {
                    id: &s.id,
                    created_at: s.created_at,
                    paths: canonical::sorted(&s.paths),
                    tags: canonical::sorted(&s.tags),
                    size: s.size,
                    tree_hash: &s.tree_hash,
                })
                .collect(),
        })
    }

    /// Recomputes the Merkle root over this manifest's snapshot ids.
    pub fn computed_merkle_root(&self) -> String {
        let ids: Vec<String> = self.snapshots.iter().map(|s| s.id.clone()).collect();
        merkle_root(&ids)
    }
}

/// Result of comparing the manifest's snapshot set against what the
/// storage collaborator actually reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// Ids the manifest lists but storage does not have.
    pub missing: Vec<String>,
    /// Ids storage has but the manifest does not list.
    pub unexpected: Vec<String>,
    /// Whether the two sets matched exactly.
    pub verified: bool,
}

/// Deterministic Merkle root over a set of snapshot ids.
///
/// Ids are sorted ascending; each id's UTF-8 bytes are hashed with SHA-256;
/// adjacent leaves are pair-hashed, an odd final leaf is carried up
/// unchanged. The empty set yields the empty string.
pub fn merkle_root(ids: &[String]) -> String {
    if ids.is_empty() {
        return String::new();
    }
    let sorted = canonical::sorted(ids);
    let mut level: Vec<[u8; 32]> = sorted.iter().map(|id| sha256_bytes(id.as_bytes())).collect();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len() / 2 + 1);
        let mut chunks = level.chunks_exact(2);
        for pair in &mut chunks {
            let mut buf = [0u8; 64];
            buf[..32].copy_from_slice(&pair[0]);
            buf[32..].copy_from_slice(&pair[1]);
            next.push(sha256_bytes(&buf));
        }
        if let [odd] = chunks.remainder() {
            next.push(*odd);
        }
        level = next;
    }
    hex::encode(level[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_set_has_empty_root() {
        assert_eq!(merkle_root(&[]), "");
    }

    #[test]
    fn root_invariant_under_permutation() {
        let a = merkle_root(&ids(&["s1", "s2", "s3"]));
        let b = merkle_root(&ids(&["s3", "s1", "s2"]));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn root_changes_when_set_changes() {
        let with = merkle_root(&ids(&["s1", "s2", "s3"]));
        let without = merkle_root(&ids(&["s1", "s3"]));
        assert_ne!(with, without);
    }

    #[test]
    fn single_leaf_root_is_leaf_hash() {
        let root = merkle_root(&ids(&["only"]));
        assert_eq!(root, hex::encode(sha256_bytes(b"only")));
    }

    #[test]
    fn odd_leaf_is_carried_up() {
        // With three leaves a, b, c (sorted), the root must be
        // H(H(a)||H(b)) paired with H(c) at the next level.
        let sorted = ids(&["a", "b", "c"]);
        let ha = sha256_bytes(b"a");
        let hb = sha256_bytes(b"b");
        let hc = sha256_bytes(b"c");
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(&ha);
        buf[32..].copy_from_slice(&hb);
        let hab = sha256_bytes(&buf);
        buf[..32].copy_from_slice(&hab);
        buf[32..].copy_from_slice(&hc);
        let expected = hex::encode(sha256_bytes(&buf));
        assert_eq!(merkle_root(&sorted), expected);
    }
}
