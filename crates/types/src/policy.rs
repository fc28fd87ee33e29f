//! The jointly signed operational contract between Owner and Host.

use crate::canonical::hash_view;
use crate::error::CodecError;
use serde::{Deserialize, Serialize};

/// Who must consent before stored data may be destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionMode {
    /// Owner and Host must both approve.
    BothRequired,
    /// Owner approval alone suffices.
    OwnerOnly,
    /// Deletion is gated only by retention time locks.
    TimeLockOnly,
    /// Deletion is never permitted.
    Never,
}

impl DeletionMode {
    /// Strictness rank used when judging whether a replacement policy
    /// weakens the active one. Higher is stricter.
    pub fn strictness(self) -> u8 {
        match self {
            DeletionMode::Never => 3,
            DeletionMode::BothRequired => 2,
            DeletionMode::OwnerOnly => 1,
            DeletionMode::TimeLockOnly => 0,
        }
    }
}

/// The two-signature policy contract.
///
/// A policy is *active* only when both signatures verify over the canonical
/// hash excluding the two signature fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Random 8-byte hex id.
    pub id: String,
    /// Monotonic contract version.
    pub version: u32,
    /// Owner display name.
    pub owner_name: String,
    /// Owner stable key id.
    pub owner_key_id: String,
    /// Owner Ed25519 public key, lowercase hex.
    pub owner_public_key: String,
    /// Host display name.
    pub host_name: String,
    /// Host stable key id.
    pub host_key_id: String,
    /// Host Ed25519 public key, lowercase hex.
    pub host_public_key: String,
    /// How long snapshots must be retained.
    pub retention_days: u32,
    /// Who must consent to deletions.
    pub deletion_mode: DeletionMode,
    /// Storage ceiling the Host commits to.
    pub max_storage_bytes: u64,
    /// When set, the Host must reject replacement policies that weaken
    /// retention, deletion mode, or this flag.
    pub append_only_locked: bool,
    /// Unix seconds at creation.
    pub created_at: i64,
    /// Unix seconds from which the contract applies.
    pub effective_at: i64,
    /// Unix seconds after which the contract lapses, zero for none.
    pub expires_at: i64,
    /// Owner signature over the canonical hash, empty until signed.
    #[serde(default)]
    pub owner_signature: String,
    /// Host signature over the canonical hash, empty until signed.
    #[serde(default)]
    pub host_signature: String,
}

#[derive(Serialize)]
struct PolicySigningView<'a> {
    id: &'a str,
    version: u32,
    owner_name: &'a str,
    owner_key_id: &'a str,
    owner_public_key: &'a str,
    host_name: &'a str,
    host_key_id: &'a str,
    host_public_key: &'a str,
    retention_days: u32,
    deletion_mode: DeletionMode,
    max_storage_bytes: u64,
    append_only_locked: bool,
    created_at: i64,
    effective_at: i64,
    expires_at: i64,
}

impl Policy {
    /// The canonical hash both parties sign, excluding both signature fields.
    pub fn signing_hash(&self) -> Result<String, CodecError> {
        hash_view(&PolicySigningView {
            id: &self.id,
            version: self.version,
            owner_name: &self.owner_name,
            owner_key_id: &self.owner_key_id,
            owner_public_key: &self.owner_public_key,
            host_name: &self.host_name,
            host_key_id: &self.host_key_id,
            host_public_key: &self.host_public_key,
            retention_days: self.retention_days,
            deletion_mode: self.deletion_mode,
            max_storage_bytes: self.max_storage_bytes,
            append_only_locked: self.append_only_locked,
            created_at: self.created_at,
            effective_at: self.effective_at,
            expires_at: self.expires_at,
        })
    }

    /// Whether both parties have applied a signature. Cryptographic
    /// verification is the policy manager's job; this only checks presence.
    pub fn is_fully_signed(&self) -> bool {
        !self.owner_signature.is_empty() && !self.host_signature.is_empty()
    }
}
