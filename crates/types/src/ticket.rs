//! Owner-signed deletion capabilities and their usage receipts.
//!
//! A ticket's validity is purely a function of its signed content and the
//! current time; there is no server-side ACL behind it.

use crate::canonical::{self, hash_view};
use crate::error::CodecError;
use serde::{Deserialize, Serialize};

/// The shape of a ticket's authorization scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketTargetType {
    /// Authorizes deleting whole snapshots by id.
    Snapshot,
    /// Authorizes deleting paths, exact or trailing-`*` prefix.
    File,
    /// Authorizes pruning targets older than a cutoff.
    Prune,
}

/// The scope a ticket authorizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketTarget {
    /// Which matching rule applies.
    #[serde(rename = "type")]
    pub target_type: TicketTargetType,
    /// Snapshot ids covered by a `snapshot` ticket.
    #[serde(default)]
    pub snapshot_ids: Vec<String>,
    /// Paths covered by a `file` ticket; a trailing `*` makes an entry a
    /// prefix pattern.
    #[serde(default)]
    pub paths: Vec<String>,
    /// Unix-seconds cutoff for a `prune` ticket; targets created before
    /// this instant are eligible. Zero means unset.
    #[serde(default)]
    pub older_than: i64,
}

/// An Owner-signed, scope-bounded, time-bounded deletion capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Random 8-byte hex id.
    pub id: String,
    /// Stable key id of the issuing Owner.
    pub owner_key_id: String,
    /// What this ticket authorizes.
    pub target: TicketTarget,
    /// Human-readable justification.
    pub reason: String,
    /// Unix seconds at issuance.
    pub created_at: i64,
    /// Unix seconds after which the ticket lapses; zero means never.
    pub expires_at: i64,
    /// Owner signature over the canonical hash, lowercase hex.
    #[serde(default)]
    pub owner_signature: String,
}

/// A Host-countersigned record of a ticket being exercised. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketUsage {
    /// The exercised ticket.
    pub ticket_id: String,
    /// Unix seconds at which the deletion ran.
    pub used_at: i64,
    /// Stable key id of the signing Host.
    pub host_key_id: String,
    /// Paths actually deleted, sorted ascending.
    pub deleted_paths: Vec<String>,
    /// Host signature over the canonical hash, lowercase hex.
    #[serde(default)]
    pub host_signature: String,
}

#[derive(Serialize)]
struct TicketSigningView<'a> {
    id: &'a str,
    owner_key_id: &'a str,
    target_type: TicketTargetType,
    snapshot_ids: Vec<String>,
    paths: Vec<String>,
    older_than: i64,
    reason: &'a str,
    created_at: i64,
    expires_at: i64,
}

#[derive(Serialize)]
struct UsageSigningView<'a> {
    ticket_id: &'a str,
    used_at: i64,
    deleted_paths: Vec<String>,
    host_key_id: &'a str,
}

impl Ticket {
    /// The canonical hash the Owner signs, with target arrays sorted.
    pub fn signing_hash(&self) -> Result<String, CodecError> {
        hash_view(&TicketSigningView {
            id: &self.id,
            owner_key_id: &self.owner_key_id,
            target_type: self.target.target_type,
            snapshot_ids: canonical::sorted(&self.target.snapshot_ids),
            paths: canonical::sorted(&self.target.paths),
            older_than: self.target.older_than,
            reason: &self.reason,
            created_at: self.created_at,
            expires_at: self.expires_at,
        })
    }

    /// Whether the ticket has lapsed at `now`. Zero `expires_at` never
    /// expires.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at > 0 && now > self.expires_at
    }

    /// Whether this ticket authorizes deleting `path` / `snapshot_id`.
    ///
    /// Snapshot tickets match listed snapshot ids; file tickets match a
    /// listed path exactly or via a trailing-`*` prefix pattern; prune
    /// tickets match when a cutoff is set, leaving age verification of the
    /// concrete target to the caller.
    pub fn matches(&self, path: &str, snapshot_id: &str) -> bool {
        match self.target.target_type {
            TicketTargetType::Snapshot => self
                .target
                .snapshot_ids
                .iter()
                .any(|id| id == snapshot_id),
            TicketTargetType::File => self.target.paths.iter().any(|p| {
                if let Some(prefix) = p.strip_suffix('*') {
                    path.starts_with(prefix)
                } else {
                    p == path
                }
            }),
            TicketTargetType::Prune => self.target.older_than > 0,
        }
    }
}

impl TicketUsage {
    /// The canonical hash the Host countersigns.
    pub fn signing_hash(&self) -> Result<String, CodecError> {
        hash_view(&UsageSigningView {
            ticket_id: &self.ticket_id,
            used_at: self.used_at,
            deleted_paths: canonical::sorted(&self.deleted_paths),
            host_key_id: &self.host_key_id,
        })
    }
}
