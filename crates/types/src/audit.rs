//! Audit-chain entries and chain verification reports.

use crate::canonical::hash_view;
use crate::error::CodecError;
use serde::{Deserialize, Serialize};

/// The previous-hash sentinel carried by the first entry of a chain.
pub const GENESIS_HASH: &str = "genesis";

/// One hash-chained, Host-signed record of a consequential operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Random 8-byte hex id.
    pub id: String,
    /// Strictly increasing sequence number, starting at 1, no gaps.
    pub sequence: u64,
    /// Unix seconds at which the entry was recorded.
    pub timestamp: i64,
    /// Operation tag, e.g. `SNAPSHOT_ADD` or `TICKET_USE`.
    pub operation: String,
    /// Path the operation touched, empty when not path-scoped.
    pub path: String,
    /// Free-form detail string.
    pub details: String,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error text for failed operations, empty otherwise.
    #[serde(default)]
    pub error: String,
    /// Content hash of the preceding entry, `"genesis"` for the first.
    pub previous_hash: String,
    /// SHA-256 over this entry's canonical serialization.
    pub content_hash: String,
    /// Stable key id of the signing Host, empty when signing is disabled.
    #[serde(default)]
    pub host_key_id: String,
    /// Host signature over the content-hash bytes, empty when unsigned.
    #[serde(default)]
    pub host_signature: String,
}

#[derive(Serialize)]
struct AuditSigningView<'a> {
    id: &'a str,
    sequence: u64,
    timestamp: i64,
    operation: &'a str,
    path: &'a str,
    details: &'a str,
    success: bool,
    error: &'a str,
    previous_hash: &'a str,
    host_key_id: &'a str,
}

impl AuditEntry {
    /// Recomputes the content hash from this entry's fields, excluding
    /// `content_hash` and `host_signature`.
    pub fn compute_content_hash(&self) -> Result<String, CodecError> {
        hash_view(&AuditSigningView {
            id: &self.id,
            sequence: self.sequence,
            timestamp: self.timestamp,
            operation: &self.operation,
            path: &self.path,
            details: &self.details,
            success: self.success,
            error: &self.error,
            previous_hash: &self.previous_hash,
            host_key_id: &self.host_key_id,
        })
    }
}

/// Outcome of walking a hash chain from genesis.
///
/// Verification stops at the first broken entry; the chain is never
/// rewritten on repair. Detection is the whole point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainVerifyReport {
    /// Whether every entry satisfied all chain invariants.
    pub valid: bool,
    /// Number of entries examined in total.
    pub total_entries: u64,
    /// Entries that satisfied all invariants before the first break.
    pub valid_entries: u64,
    /// Entries carrying a verified signature.
    pub signed_entries: u64,
    /// Index of the first broken entry, if any.
    pub first_broken_at: Option<u64>,
    /// One message per broken invariant category.
    pub errors: Vec<String>,
}

impl ChainVerifyReport {
    /// A report over an empty, trivially valid chain.
    pub fn empty() -> Self {
        Self {
            valid: true,
            total_entries: 0,
            valid_entries: 0,
            signed_entries: 0,
            first_broken_at: None,
            errors: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> AuditEntry {
        AuditEntry {
            id: "0102030405060708".into(),
            sequence: 1,
            timestamp: 1_700_000_000,
            operation: "CREATE".into(),
            path: "/data/x".into(),
            details: "".into(),
            success: true,
            error: String::new(),
            previous_hash: GENESIS_HASH.into(),
            content_hash: String::new(),
            host_key_id: "aabbccddeeff0011".into(),
            host_signature: String::new(),
        }
    }

    #[test]
    fn content_hash_excludes_hash_and_signature() {
        let mut a = entry();
        let base = a.compute_content_hash().unwrap();
        a.content_hash = base.clone();
        a.host_signature = "ff".repeat(64);
        assert_eq!(a.compute_content_hash().unwrap(), base);
    }

    #[test]
    fn content_hash_covers_every_other_field() {
        let base = entry().compute_content_hash().unwrap();
        let mut tampered = entry();
        tampered.path = "/tamper".into();
        assert_ne!(tampered.compute_content_hash().unwrap(), base);
        let mut tampered = entry();
        tampered.success = false;
        assert_ne!(tampered.compute_content_hash().unwrap(), base);
    }
}
