//! Restore and deletion consent requests.
//!
//! Both request kinds share one state machine: `pending` initially,
//! terminal on any other status. Approvals accrue while pending; the
//! request flips to `approved` once the threshold is met. Expiry is
//! observed lazily against `expires_at`.

use crate::canonical::{self, hash_view};
use crate::error::CodecError;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a consent request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Accepting approvals.
    Pending,
    /// Threshold reached; terminal.
    Approved,
    /// Explicitly denied; terminal.
    Denied,
    /// Deadline passed without resolution; terminal.
    Expired,
}

impl RequestStatus {
    /// Whether the status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        self != RequestStatus::Pending
    }
}

/// What a deletion request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionType {
    /// Whole snapshots by id.
    Snapshot,
    /// Individual paths.
    Path,
    /// Snapshots older than a retention cutoff.
    Prune,
    /// Everything the Host stores.
    All,
}

/// A single key-holder's recorded approval.
///
/// An approval is only appended after its signature verified against the
/// canonical hash of the referenced request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    /// Stable id of the approving holder.
    pub key_holder_id: String,
    /// Display name at approval time.
    pub key_holder_name: String,
    /// Ed25519 signature, lowercase hex.
    pub signature: String,
    /// Unix seconds at which the approval was recorded.
    pub approved_at: i64,
}

/// A share contributed in the legacy secret-share consent mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredShare {
    /// Holder that contributed the share.
    pub key_holder_id: String,
    /// The share's evaluation index.
    pub index: u8,
    /// Share bytes, lowercase hex.
    pub data: String,
    /// Unix seconds at which the share was recorded.
    pub added_at: i64,
}

/// Threshold progress reported by signing operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalProgress {
    /// Approvals collected so far.
    pub current: u32,
    /// Approvals required for the request to pass.
    pub required: u32,
    /// Whether the threshold has been reached.
    pub is_approved: bool,
}

/// An Owner-created request to restore data from a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreRequest {
    /// Random 8-byte hex id.
    pub id: String,
    /// Display name of the requester.
    pub requester: String,
    /// Snapshot to restore from; the literal `"latest"` is allowed.
    pub snapshot_id: String,
    /// Paths to restore, canonicalized ascending before signing.
    pub paths: Vec<String>,
    /// Human-readable justification.
    pub reason: String,
    /// Current lifecycle status.
    pub status: RequestStatus,
    /// Unix seconds at creation.
    pub created_at: i64,
    /// Unix seconds after which the request expires.
    pub expires_at: i64,
    /// Approval threshold.
    pub required_approvals: u32,
    /// Approvals collected so far.
    pub approvals: Vec<Approval>,
    /// Shares collected in secret-share mode.
    #[serde(default)]
    pub shares: Vec<StoredShare>,
    /// Unix seconds at which the threshold was reached, if it was.
    #[serde(default)]
    pub approved_at: i64,
}

/// An Owner-created request to destroy stored data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionRequest {
    /// Random 8-byte hex id.
    pub id: String,
    /// Display name of the requester.
    pub requester: String,
    /// What kind of deletion is being consented to.
    pub deletion_type: DeletionType,
    /// Target snapshot ids.
    pub snapshot_ids: Vec<String>,
    /// Target paths.
    pub paths: Vec<String>,
    /// Human-readable justification.
    pub reason: String,
    /// Current lifecycle status.
    pub status: RequestStatus,
    /// Unix seconds at creation.
    pub created_at: i64,
    /// Unix seconds after which the request expires.
    pub expires_at: i64,
    /// Approval threshold.
    pub required_approvals: u32,
    /// Approvals collected so far.
    pub approvals: Vec<Approval>,
    /// Shares collected in secret-share mode.
    #[serde(default)]
    pub shares: Vec<StoredShare>,
    /// Unix seconds at which the threshold was reached, if it was.
    #[serde(default)]
    pub approved_at: i64,
    /// Unix seconds at which the deletion was executed, zero until then.
    #[serde(default)]
    pub executed_at: i64,
}

// Canonical signing views. Field order is the normative contract; the
// signing holder's id is bound into the hash so one holder's signature can
// never be replayed as another's.

#[derive(Serialize)]
struct RestoreSigningView<'a> {
    request_id: &'a str,
    requester: &'a str,
    snapshot_id: &'a str,
    paths: Vec<String>,
    reason: &'a str,
    created_at: i64,
    key_holder_id: &'a str,
}

#[derive(Serialize)]
struct DeletionSigningView<'a> {
    request_id: &'a str,
    requester: &'a str,
    deletion_type: DeletionType,
    snapshot_ids: Vec<String>,
    paths: Vec<String>,
    reason: &'a str,
    created_at: i64,
    key_holder_id: &'a str,
}

impl RestoreRequest {
    /// The canonical hash a given holder signs to approve this request.
    pub fn signing_hash(&self, key_holder_id: &str) -> Result<String, CodecError> {
        hash_view(&RestoreSigningView {
            request_id: &self.id,
            requester: &self.requester,
            snapshot_id: &self.snapshot_id,
            paths: canonical::sorted(&self.paths),
            reason: &self.reason,
            created_at: self.created_at,
            key_holder_id,
        })
    }

    /// Whether the deadline has passed at `now`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at > 0 && now > self.expires_at
    }

    /// Current threshold progress.
    pub fn progress(&self) -> ApprovalProgress {
        ApprovalProgress {
            current: self.approvals.len() as u32,
            required: self.required_approvals,
            is_approved: self.status == RequestStatus::Approved,
        }
    }
}

impl DeletionRequest {
    /// The canonical hash a given holder signs to approve this request.
    pub fn signing_hash(&self, key_holder_id: &str) -> Result<String, CodecError> {
        hash_view(&DeletionSigningView {
            request_id: &self.id,
            requester: &self.requester,
            deletion_type: self.deletion_type,
            snapshot_ids: canonical::sorted(&self.snapshot_ids),
            paths: canonical::sorted(&self.paths),
            reason: &self.reason,
            created_at: self.created_at,
            key_holder_id,
        })
    }

    /// Whether the deadline has passed at `now`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at > 0 && now > self.expires_at
    }

    /// Current threshold progress.
    pub fn progress(&self) -> ApprovalProgress {
        ApprovalProgress {
            current: self.approvals.len() as u32,
            required: self.required_approvals,
            is_approved: self.status == RequestStatus::Approved,
        }
    }
}
