//! The append-only, hash-chained, Host-signed audit log.
//!
//! `record` calls are totally ordered by the manager's write lock; the
//! entry file and the head sidecar are replaced atomically under the
//! advisory file lock. Verification never repairs anything; a broken
//! chain is evidence, and detection is the whole point.

use crate::error::LedgerError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use vaultward_crypto::key_store::LocalIdentity;
use vaultward_crypto::{nonce, sign};
use vaultward_storage::{atomic, dir, FileLock, StateDir};
use vaultward_types::audit::{AuditEntry, ChainVerifyReport, GENESIS_HASH};
use vaultward_types::time::unix_now;

/// The `audit-chain-state.json` sidecar: a cheap external view of the head.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainHeadState {
    /// Sequence of the newest entry.
    pub sequence: u64,
    /// Content hash of the newest entry.
    pub last_hash: String,
    /// Total entries on disk.
    pub entry_count: u64,
}

struct ChainHead {
    sequence: u64,
    last_hash: String,
    /// Recent entries kept for fast reads; trimmed to the configured
    /// window without ever touching file content or the sequence counter.
    recent: Vec<AuditEntry>,
}

/// Owns the persisted audit chain.
pub struct AuditChain {
    entries_path: PathBuf,
    state_path: PathBuf,
    lock: FileLock,
    signer: Option<LocalIdentity>,
    host_public_key_hex: Option<String>,
    max_recent: Option<usize>,
    inner: RwLock<ChainHead>,
}

impl AuditChain {
    /// Opens the chain in `state`. When `signer` is set, every entry is
    /// signed with it and verification checks signatures against its key.
    pub fn open(state: &StateDir, signer: Option<LocalIdentity>) -> Result<Self, LedgerError> {
        let entries_path = state.file(dir::AUDIT_CHAIN_FILE);
        let state_path = state.file(dir::AUDIT_STATE_FILE);
        let lock = FileLock::new(&entries_path);

        // The entry file is the source of truth; the sidecar is derived.
        let entries: Vec<AuditEntry> = atomic::read_json_or_default(&entries_path)?;
        let head = match entries.last() {
            Some(last) => ChainHead {
                sequence: last.sequence,
                last_hash: last.content_hash.clone(),
                recent: entries,
            },
            None => ChainHead {
                sequence: 0,
                last_hash: String::new(),
                recent: Vec::new(),
            },
        };

        let host_public_key_hex = signer.as_ref().map(|s| s.public_key_hex());
        Ok(Self {
            entries_path,
            state_path,
            lock,
            signer,
            host_public_key_hex,
            max_recent: None,
            inner: RwLock::new(head),
        })
    }

    /// Limits the in-memory window to `n` recent entries. Read-side only;
    /// file content and the sequence counter are unaffected.
    pub fn with_max_entries(mut self, n: usize) -> Self {
        self.max_recent = Some(n);
        let mut inner = self.inner.write();
        let len = inner.recent.len();
        if len > n {
            inner.recent.drain(..len - n);
        }
        drop(inner);
        self
    }

    /// Sets the public key used for signature verification when this side
    /// of the protocol does not hold the signing key.
    pub fn with_verify_key(mut self, host_public_key_hex: &str) -> Self {
        self.host_public_key_hex = Some(host_public_key_hex.to_string());
        self
    }

    /// Appends one entry, chaining and signing it, and persists both the
    /// entry file and the head sidecar atomically.
    pub fn record(
        &self,
        operation: &str,
        path: &str,
        details: &str,
        success: bool,
        error: Option<&str>,
    ) -> Result<AuditEntry, LedgerError> {
        let mut inner = self.inner.write();

        let previous_hash = if inner.sequence == 0 {
            GENESIS_HASH.to_string()
        } else {
            inner.last_hash.clone()
        };
        let mut entry = AuditEntry {
            id: nonce::random_id(),
            sequence: inner.sequence + 1,
            timestamp: unix_now(),
            operation: operation.to_string(),
            path: path.to_string(),
            details: details.to_string(),
            success,
            error: error.unwrap_or_default().to_string(),
            previous_hash,
            content_hash: String::new(),
            host_key_id: self
                .signer
                .as_ref()
                .map(|s| s.key_id.clone())
                .unwrap_or_default(),
            host_signature: String::new(),
        };
        entry.content_hash = entry.compute_content_hash()?;
        if let Some(signer) = &self.signer {
            entry.host_signature = signer.sign_hex(entry.content_hash.as_bytes())?;
        }

        self.lock.with_lock(|| {
            let mut entries: Vec<AuditEntry> = atomic::read_json_or_default(&self.entries_path)?;
            entries.push(entry.clone());
            atomic::write_json(&self.entries_path, &entries)?;
            atomic::write_json(
                &self.state_path,
                &ChainHeadState {
                    sequence: entry.sequence,
                    last_hash: entry.content_hash.clone(),
                    entry_count: entries.len() as u64,
                },
            )
        })?;

        inner.sequence = entry.sequence;
        inner.last_hash = entry.content_hash.clone();
        inner.recent.push(entry.clone());
        if let Some(max) = self.max_recent {
            let len = inner.recent.len();
            if len > max {
                inner.recent.drain(..len - max);
            }
        }
        tracing::debug!(target: "audit", sequence = entry.sequence, operation, "entry recorded");
        Ok(entry)
    }

    fn read_all(&self) -> Result<Vec<AuditEntry>, LedgerError> {
        let entries = self
            .lock
            .with_lock(|| atomic::read_json_or_default::<Vec<AuditEntry>>(&self.entries_path))?;
        Ok(entries)
    }

    /// Walks the full chain from genesis, checking sequence continuity,
    /// hash linkage, content hashes, and signatures. Stops at the first
    /// broken entry.
    pub fn verify(&self) -> Result<ChainVerifyReport, LedgerError> {
        let entries = self.read_all()?;
        Ok(verify_entries(
            &entries,
            self.host_public_key_hex.as_deref(),
        ))
    }

    /// Entries filtered by operation tag, then windowed by offset/limit.
    pub fn get_entries(
        &self,
        limit: usize,
        offset: usize,
        filter_operation: Option<&str>,
    ) -> Result<Vec<AuditEntry>, LedgerError> {
        let entries = self.read_all()?;
        Ok(entries
            .into_iter()
            .filter(|e| filter_operation.map_or(true, |op| e.operation == op))
            .skip(offset)
            .take(limit)
            .collect())
    }

    /// Entries with a sequence strictly greater than `seq`.
    pub fn get_entries_since(&self, seq: u64) -> Result<Vec<AuditEntry>, LedgerError> {
        let entries = self.read_all()?;
        Ok(entries.into_iter().filter(|e| e.sequence > seq).collect())
    }

    /// The full chain, for checkpointing or external verification.
    pub fn export(&self) -> Result<Vec<AuditEntry>, LedgerError> {
        self.read_all()
    }

    /// The in-memory window of recent entries, without touching the file.
    pub fn recent(&self) -> Vec<AuditEntry> {
        self.inner.read().recent.clone()
    }

    /// Content hash of the newest entry, empty for an empty chain.
    pub fn get_latest_hash(&self) -> String {
        self.inner.read().last_hash.clone()
    }

    /// Sequence of the newest entry, zero for an empty chain.
    pub fn get_sequence(&self) -> u64 {
        self.inner.read().sequence
    }
}

/// Chain verification over a slice of entries, independent of any manager.
pub fn verify_entries(entries: &[AuditEntry], host_public_key_hex: Option<&str>) -> ChainVerifyReport {
    let mut report = ChainVerifyReport::empty();
    report.total_entries = entries.len() as u64;

    for (i, entry) in entries.iter().enumerate() {
        let expected_seq = i as u64 + 1;
        if entry.sequence != expected_seq {
            report.valid = false;
            report.first_broken_at = Some(i as u64);
            report.errors.push(format!(
                "sequence gap at index {}: expected {}, found {}",
                i, expected_seq, entry.sequence
            ));
            return report;
        }

        let expected_prev = if i == 0 {
            GENESIS_HASH
        } else {
            entries[i - 1].content_hash.as_str()
        };
        if entry.previous_hash != expected_prev {
            report.valid = false;
            report.first_broken_at = Some(i as u64);
            report
                .errors
                .push(format!("chain broken at index {}: previous hash mismatch", i));
            return report;
        }

        match entry.compute_content_hash() {
            Ok(computed) if computed == entry.content_hash => {}
            Ok(_) => {
                report.valid = false;
                report.first_broken_at = Some(i as u64);
                report
                    .errors
                    .push(format!("content tampered at index {}", i));
                return report;
            }
            Err(e) => {
                report.valid = false;
                report.first_broken_at = Some(i as u64);
                report
                    .errors
                    .push(format!("content hash failed at index {}: {}", i, e));
                return report;
            }
        }

        if !entry.host_signature.is_empty() {
            match host_public_key_hex {
                Some(pk) => {
                    if sign::verify_hex(pk, entry.content_hash.as_bytes(), &entry.host_signature) {
                        report.signed_entries += 1;
                    } else {
                        report.valid = false;
                        report.first_broken_at = Some(i as u64);
                        report
                            .errors
                            .push(format!("bad signature at index {}", i));
                        return report;
                    }
                }
                // Signature present but no key configured: counted, not checked.
                None => report.signed_entries += 1,
            }
        }

        report.valid_entries += 1;
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use vaultward_types::identity::Role;

    fn chain(dir: &std::path::Path) -> AuditChain {
        let state = StateDir::new(dir);
        state.ensure().unwrap();
        let host = LocalIdentity::generate(Role::Host).unwrap();
        AuditChain::open(&state, Some(host)).unwrap()
    }

    #[test]
    fn sequential_records_form_valid_chain() {
        let dir = tempdir().unwrap();
        let c = chain(dir.path());
        for op in ["CREATE", "DELETE", "CREATE"] {
            c.record(op, "/data/x", "", true, None).unwrap();
        }
        let report = c.verify().unwrap();
        assert!(report.valid);
        assert_eq!(report.total_entries, 3);
        assert_eq!(report.valid_entries, 3);
        assert_eq!(report.signed_entries, 3);
        assert_eq!(c.get_sequence(), 3);

        let entries = c.export().unwrap();
        assert_eq!(entries[0].previous_hash, GENESIS_HASH);
        assert_eq!(entries[1].previous_hash, entries[0].content_hash);
        assert_eq!(entries[2].previous_hash, entries[1].content_hash);
    }

    #[test]
    fn tampering_is_detected_at_the_entry() {
        let dir = tempdir().unwrap();
        let c = chain(dir.path());
        for op in ["CREATE", "DELETE", "CREATE"] {
            c.record(op, "/data/x", "", true, None).unwrap();
        }

        let path = dir.path().join(vaultward_storage::dir::AUDIT_CHAIN_FILE);
        let mut entries: Vec<AuditEntry> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        entries[1].path = "/tamper".into();
        std::fs::write(&path, serde_json::to_vec(&entries).unwrap()).unwrap();

        let report = c.verify().unwrap();
        assert!(!report.valid);
        assert_eq!(report.first_broken_at, Some(1));
        assert!(report.errors.iter().any(|e| e.contains("content tampered")));
    }

    #[test]
    fn sequence_survives_reopen() {
        let dir = tempdir().unwrap();
        let state = StateDir::new(dir.path());
        state.ensure().unwrap();
        let host = LocalIdentity::generate(Role::Host).unwrap();
        {
            let c = AuditChain::open(&state, Some(host.clone())).unwrap();
            c.record("CREATE", "/a", "", true, None).unwrap();
            c.record("CREATE", "/b", "", true, None).unwrap();
        }
        let c = AuditChain::open(&state, Some(host)).unwrap();
        assert_eq!(c.get_sequence(), 2);
        let entry = c.record("DELETE", "/a", "", true, None).unwrap();
        assert_eq!(entry.sequence, 3);
        assert!(c.verify().unwrap().valid);
    }

    #[test]
    fn window_trim_does_not_touch_file_or_sequence() {
        let dir = tempdir().unwrap();
        let state = StateDir::new(dir.path());
        state.ensure().unwrap();
        let host = LocalIdentity::generate(Role::Host).unwrap();
        let c = AuditChain::open(&state, Some(host))
            .unwrap()
            .with_max_entries(2);
        for i in 0..5 {
            c.record("CREATE", &format!("/f{}", i), "", true, None).unwrap();
        }
        assert_eq!(c.get_sequence(), 5);
        assert_eq!(c.recent().len(), 2);
        assert_eq!(c.export().unwrap().len(), 5);
        assert!(c.verify().unwrap().valid);
    }

    #[test]
    fn failures_are_recorded_with_error_text() {
        let dir = tempdir().unwrap();
        let c = chain(dir.path());
        let entry = c
            .record("DELETE", "/x", "", false, Some("no authorizing ticket"))
            .unwrap();
        assert!(!entry.success);
        assert_eq!(entry.error, "no authorizing ticket");
        assert!(c.verify().unwrap().valid);
    }

    #[test]
    fn get_entries_filters_and_windows() {
        let dir = tempdir().unwrap();
        let c = chain(dir.path());
        for op in ["CREATE", "DELETE", "CREATE", "CREATE"] {
            c.record(op, "/x", "", true, None).unwrap();
        }
        let creates = c.get_entries(10, 0, Some("CREATE")).unwrap();
        assert_eq!(creates.len(), 3);
        let paged = c.get_entries(2, 1, Some("CREATE")).unwrap();
        assert_eq!(paged.len(), 2);
        let since = c.get_entries_since(2).unwrap();
        assert_eq!(since.len(), 2);
        assert!(since.iter().all(|e| e.sequence > 2));
    }
}
