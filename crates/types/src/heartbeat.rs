//! Host heartbeats and the dead-man switch.

use crate::canonical::hash_view;
use crate::error::CodecError;
use serde::{Deserialize, Serialize};

/// One hash-chained, Host-signed liveness beacon.
///
/// Chain and signature invariants are identical in form to the audit chain,
/// at a denser cadence, optionally embedding a summary of system state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Random 8-byte hex id.
    pub id: String,
    /// Unix seconds at which the heartbeat was produced.
    pub timestamp: i64,
    /// Strictly increasing sequence number, starting at 1.
    pub sequence: u64,
    /// Random 16-byte nonce, lowercase hex.
    pub nonce: String,
    /// Content hash of the preceding heartbeat, `"genesis"` for the first.
    pub previous_hash: String,
    /// SHA-256 over this heartbeat's canonical serialization.
    pub content_hash: String,
    /// Stable key id of the signing Host.
    #[serde(default)]
    pub host_key_id: String,
    /// Host signature over the content-hash bytes.
    #[serde(default)]
    pub host_signature: String,
    /// Audit-chain head hash at beat time, empty when not embedded.
    #[serde(default)]
    pub audit_chain_hash: String,
    /// Audit-chain sequence at beat time, zero when not embedded.
    #[serde(default)]
    pub audit_chain_seq: u64,
    /// Snapshot count at beat time, zero when not embedded.
    #[serde(default)]
    pub snapshot_count: u64,
    /// Stored bytes at beat time, zero when not embedded.
    #[serde(default)]
    pub total_bytes: u64,
    /// Canary-file status reported by the external scanner, empty when not
    /// embedded.
    #[serde(default)]
    pub canary_status: String,
}

/// Optional system-state summary embedded into a heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemSummary {
    /// Audit-chain head hash.
    pub audit_chain_hash: String,
    /// Audit-chain sequence.
    pub audit_chain_seq: u64,
    /// Number of snapshots in the manifest.
    pub snapshot_count: u64,
    /// Total stored bytes.
    pub total_bytes: u64,
    /// Canary-file status.
    pub canary_status: String,
}

#[derive(Serialize)]
struct HeartbeatSigningView<'a> {
    id: &'a str,
    timestamp: i64,
    sequence: u64,
    audit_chain_hash: &'a str,
    audit_chain_seq: u64,
    snapshot_count: u64,
    total_bytes: u64,
    canary_status: &'a str,
    nonce: &'a str,
    previous_hash: &'a str,
    host_key_id: &'a str,
}

impl Heartbeat {
    /// Recomputes the content hash, excluding `content_hash` and
    /// `host_signature`.
    pub fn compute_content_hash(&self) -> Result<String, CodecError> {
        hash_view(&HeartbeatSigningView {
            id: &self.id,
            timestamp: self.timestamp,
            sequence: self.sequence,
            audit_chain_hash: &self.audit_chain_hash,
            audit_chain_seq: self.audit_chain_seq,
            snapshot_count: self.snapshot_count,
            total_bytes: self.total_bytes,
            canary_status: &self.canary_status,
            nonce: &self.nonce,
            previous_hash: &self.previous_hash,
            host_key_id: &self.host_key_id,
        })
    }
}

/// Dead-man switch health, evaluated on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeadManStatus {
    /// Check-ins are arriving on time.
    Healthy,
    /// Some intervals missed.
    Warning,
    /// Many intervals missed.
    Critical,
    /// The switch tripped; recovery requires the generated code.
    Dead,
}

/// Tunable thresholds for the dead-man switch, counted in whole missed
/// intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadManConfig {
    /// Expected spacing between check-ins, in seconds.
    pub expected_interval_secs: i64,
    /// Slack subtracted from elapsed time before counting missed intervals.
    pub grace_period_secs: i64,
    /// Missed intervals at which status becomes `warning`.
    pub warning_threshold: u64,
    /// Missed intervals at which status becomes `critical`.
    pub critical_threshold: u64,
    /// Missed intervals at which status becomes `dead`.
    pub dead_threshold: u64,
}

impl Default for DeadManConfig {
    fn default() -> Self {
        Self {
            expected_interval_secs: 3600,
            grace_period_secs: 0,
            warning_threshold: 2,
            critical_threshold: 4,
            dead_threshold: 6,
        }
    }
}

/// Persisted dead-man switch state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadManSwitch {
    /// Whether evaluation is active.
    pub enabled: bool,
    /// Unix seconds of the last check-in.
    pub last_check_in: i64,
    /// Expected spacing between check-ins, in seconds.
    pub expected_interval: i64,
    /// Slack subtracted from elapsed time, in seconds.
    pub grace_period: i64,
    /// Current health.
    pub status: DeadManStatus,
    /// Whole intervals missed at last evaluation.
    pub missed_count: u64,
    /// Unix seconds at which the switch tripped, zero otherwise.
    #[serde(default)]
    pub triggered_at: i64,
    /// 128-bit random code generated on the transition into `dead`;
    /// required to reset. Empty otherwise.
    #[serde(default)]
    pub recovery_code: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::GENESIS_HASH;

    fn beat() -> Heartbeat {
        Heartbeat {
            id: "0807060504030201".into(),
            timestamp: 1_700_000_000,
            sequence: 1,
            nonce: "00".repeat(16),
            previous_hash: GENESIS_HASH.into(),
            content_hash: String::new(),
            host_key_id: "bbbbbbbbbbbbbbbb".into(),
            host_signature: String::new(),
            audit_chain_hash: String::new(),
            audit_chain_seq: 0,
            snapshot_count: 0,
            total_bytes: 0,
            canary_status: String::new(),
        }
    }

    #[test]
    fn content_hash_excludes_hash_and_signature() {
        let mut b = beat();
        let base = b.compute_content_hash().unwrap();
        b.content_hash = base.clone();
        b.host_signature = "ff".repeat(64);
        assert_eq!(b.compute_content_hash().unwrap(), base);
    }

    #[test]
    fn content_hash_covers_nonce() {
        let base = beat().compute_content_hash().unwrap();
        let mut tampered = beat();
        tampered.nonce = "11".repeat(16);
        assert_ne!(tampered.compute_content_hash().unwrap(), base);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&DeadManStatus::Critical).unwrap(),
            "\"critical\""
        );
    }
}
