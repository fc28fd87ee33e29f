//! Witness checkpoints and fan-out outcomes.

use crate::canonical::hash_view;
use crate::error::CodecError;
use serde::{Deserialize, Serialize};

/// A signed summary of control-plane state submitted to external witnesses.
///
/// `owner_key_id` is fixed at creation so the Host signature and any later
/// Owner countersignature cover the same canonical hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WitnessCheckpoint {
    /// Random 8-byte hex id.
    pub id: String,
    /// Unix seconds at creation.
    pub created_at: i64,
    /// Audit-chain sequence at checkpoint time.
    pub audit_chain_sequence: u64,
    /// Audit-chain head hash at checkpoint time.
    pub audit_chain_hash: String,
    /// Manifest Merkle root at checkpoint time.
    pub manifest_merkle_root: String,
    /// Number of snapshots in the manifest.
    pub snapshot_count: u64,
    /// Total stored bytes.
    pub total_bytes: u64,
    /// Number of files the Host stores.
    pub file_count: u64,
    /// Stable key id of the signing Host.
    pub host_key_id: String,
    /// Host signature over the canonical hash.
    #[serde(default)]
    pub host_signature: String,
    /// Stable key id of the countersigning Owner, set at creation.
    #[serde(default)]
    pub owner_key_id: String,
    /// Owner countersignature, empty until applied.
    #[serde(default)]
    pub owner_signature: String,
}

#[derive(Serialize)]
struct CheckpointSigningView<'a> {
    id: &'a str,
    created_at: i64,
    audit_chain_sequence: u64,
    audit_chain_hash: &'a str,
    manifest_merkle_root: &'a str,
    snapshot_count: u64,
    total_bytes: u64,
    file_count: u64,
    host_key_id: &'a str,
    owner_key_id: &'a str,
}

impl WitnessCheckpoint {
    /// The canonical hash both signatures cover.
    pub fn signing_hash(&self) -> Result<String, CodecError> {
        hash_view(&CheckpointSigningView {
            id: &self.id,
            created_at: self.created_at,
            audit_chain_sequence: self.audit_chain_sequence,
            audit_chain_hash: &self.audit_chain_hash,
            manifest_merkle_root: &self.manifest_merkle_root,
            snapshot_count: self.snapshot_count,
            total_bytes: self.total_bytes,
            file_count: self.file_count,
            host_key_id: &self.host_key_id,
            owner_key_id: &self.owner_key_id,
        })
    }
}

/// A witness's acknowledgement of a submitted checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WitnessReceipt {
    /// Id of the acknowledged checkpoint.
    pub checkpoint_id: String,
    /// Name of the acknowledging witness.
    pub witness_name: String,
    /// Unix seconds at which the witness recorded the checkpoint.
    pub received_at: i64,
    /// Witness-reported status string.
    #[serde(default)]
    pub status: String,
}

/// A witness's attestation about a previously submitted checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WitnessVerification {
    /// Id of the checkpoint asked about.
    pub checkpoint_id: String,
    /// Whether the witness knows the checkpoint.
    pub known: bool,
    /// Unix seconds at which the witness recorded it, zero when unknown.
    #[serde(default)]
    pub received_at: i64,
}

/// Aggregate result of fanning one checkpoint out to all witnesses.
///
/// Submission to a subset is partial success as long as at least one
/// witness accepted; partial failure is reported, never raised as an
/// early error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    /// Receipts from witnesses that accepted.
    pub receipts: Vec<WitnessReceipt>,
    /// One `witness name: error` string per witness that failed.
    pub errors: Vec<String>,
}

impl SubmissionOutcome {
    /// At least one witness accepted.
    pub fn is_accepted(&self) -> bool {
        !self.receipts.is_empty()
    }

    /// Some witnesses accepted while others failed.
    pub fn is_partial(&self) -> bool {
        !self.receipts.is_empty() && !self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint() -> WitnessCheckpoint {
        WitnessCheckpoint {
            id: "3333333333333333".into(),
            created_at: 1_700_000_000,
            audit_chain_sequence: 42,
            audit_chain_hash: "ab".repeat(32),
            manifest_merkle_root: "cd".repeat(32),
            snapshot_count: 3,
            total_bytes: 1 << 30,
            file_count: 100,
            host_key_id: "bbbbbbbbbbbbbbbb".into(),
            host_signature: String::new(),
            owner_key_id: "aaaaaaaaaaaaaaaa".into(),
            owner_signature: String::new(),
        }
    }

    #[test]
    fn hash_is_stable_across_countersigning() {
        let before = checkpoint();
        let mut after = checkpoint();
        after.host_signature = "11".repeat(64);
        after.owner_signature = "22".repeat(64);
        assert_eq!(before.signing_hash().unwrap(), after.signing_hash().unwrap());
    }

    #[test]
    fn outcome_partial_semantics() {
        let receipt = WitnessReceipt {
            checkpoint_id: "x".into(),
            witness_name: "w1".into(),
            received_at: 1,
            status: "ok".into(),
        };
        let full = SubmissionOutcome {
            receipts: vec![receipt.clone()],
            errors: vec![],
        };
        assert!(full.is_accepted() && !full.is_partial());
        let partial = SubmissionOutcome {
            receipts: vec![receipt],
            errors: vec!["w2: http 500".into()],
        };
        assert!(partial.is_accepted() && partial.is_partial());
        let failed = SubmissionOutcome {
            receipts: vec![],
            errors: vec!["w1: unreachable".into()],
        };
        assert!(!failed.is_accepted());
    }
}
