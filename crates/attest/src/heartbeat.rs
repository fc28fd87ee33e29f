//! The Host heartbeat chain.
//!
//! A denser sibling of the audit chain: each beat carries a fresh nonce,
//! the previous beat's content hash, optionally a system-state summary,
//! and a Host signature over its content hash.

use crate::error::AttestError;
use parking_lot::RwLock;
use std::path::PathBuf;
use vaultward_crypto::key_store::LocalIdentity;
use vaultward_crypto::{nonce, sign};
use vaultward_storage::{atomic, dir, FileLock, StateDir};
use vaultward_types::audit::{ChainVerifyReport, GENESIS_HASH};
use vaultward_types::heartbeat::{Heartbeat, SystemSummary};
use vaultward_types::time::unix_now;

struct HeartbeatHead {
    sequence: u64,
    last_hash: String,
}

/// Owns the persisted heartbeat log.
pub struct HeartbeatManager {
    path: PathBuf,
    lock: FileLock,
    host: LocalIdentity,
    inner: RwLock<HeartbeatHead>,
}

impl HeartbeatManager {
    /// Opens the heartbeat log in `state` for the Host identity.
    pub fn open(state: &StateDir, host: LocalIdentity) -> Result<Self, AttestError> {
        let path = state.file(dir::HEARTBEATS_FILE);
        let beats: Vec<Heartbeat> = atomic::read_json_or_default(&path)?;
        let head = match beats.last() {
            Some(last) => HeartbeatHead {
                sequence: last.sequence,
                last_hash: last.content_hash.clone(),
            },
            None => HeartbeatHead {
                sequence: 0,
                last_hash: String::new(),
            },
        };
        Ok(Self {
            lock: FileLock::new(&path),
            path,
            host,
            inner: RwLock::new(head),
        })
    }

    /// Emits one heartbeat, optionally embedding a system-state summary,
    /// and appends it to the chain.
    pub fn beat(&self, summary: Option<SystemSummary>) -> Result<Heartbeat, AttestError> {
        let mut inner = self.inner.write();
        let summary = summary.unwrap_or_default();
        let previous_hash = if inner.sequence == 0 {
            GENESIS_HASH.to_string()
        } else {
            inner.last_hash.clone()
        };
        let mut beat = Heartbeat {
            id: nonce::random_id(),
            timestamp: unix_now(),
            sequence: inner.sequence + 1,
            nonce: nonce::random_nonce(),
            previous_hash,
            content_hash: String::new(),
            host_key_id: self.host.key_id.clone(),
            host_signature: String::new(),
            audit_chain_hash: summary.audit_chain_hash,
            audit_chain_seq: summary.audit_chain_seq,
            snapshot_count: summary.snapshot_count,
            total_bytes: summary.total_bytes,
            canary_status: summary.canary_status,
        };
        beat.content_hash = beat.compute_content_hash()?;
        beat.host_signature = self.host.sign_hex(beat.content_hash.as_bytes())?;

        self.lock.with_lock(|| {
            let mut beats: Vec<Heartbeat> = atomic::read_json_or_default(&self.path)?;
            beats.push(beat.clone());
            atomic::write_json(&self.path, &beats)
        })?;

        inner.sequence = beat.sequence;
        inner.last_hash = beat.content_hash.clone();
        tracing::debug!(target: "heartbeat", sequence = beat.sequence, "heartbeat emitted");
        Ok(beat)
    }

    /// Walks the heartbeat chain from genesis, mirroring the audit chain's
    /// invariants: consecutive sequences, hash linkage, content hashes, and
    /// Host signatures.
    pub fn verify_chain(&self, host_public_key_hex: &str) -> Result<ChainVerifyReport, AttestError> {
        let beats: Vec<Heartbeat> = self
            .lock
            .with_lock(|| atomic::read_json_or_default(&self.path))?;

        let mut report = ChainVerifyReport::empty();
        report.total_entries = beats.len() as u64;
        for (i, beat) in beats.iter().enumerate() {
            let expected_seq = i as u64 + 1;
            if beat.sequence != expected_seq {
                report.valid = false;
                report.first_broken_at = Some(i as u64);
                report.errors.push(format!(
                    "sequence gap at index {}: expected {}, found {}",
                    i, expected_seq, beat.sequence
                ));
                return Ok(report);
            }
            let expected_prev = if i == 0 {
                GENESIS_HASH
            } else {
                beats[i - 1].content_hash.as_str()
            };
            if beat.previous_hash != expected_prev {
                report.valid = false;
                report.first_broken_at = Some(i as u64);
                report
                    .errors
                    .push(format!("chain broken at index {}: previous hash mismatch", i));
                return Ok(report);
            }
            match beat.compute_content_hash() {
                Ok(computed) if computed == beat.content_hash => {}
                _ => {
                    report.valid = false;
                    report.first_broken_at = Some(i as u64);
                    report
                        .errors
                        .push(format!("content tampered at index {}", i));
                    return Ok(report);
                }
            }
            if !beat.host_signature.is_empty() {
                if sign::verify_hex(
                    host_public_key_hex,
                    beat.content_hash.as_bytes(),
                    &beat.host_signature,
                ) {
                    report.signed_entries += 1;
                } else {
                    report.valid = false;
                    report.first_broken_at = Some(i as u64);
                    report.errors.push(format!("bad signature at index {}", i));
                    return Ok(report);
                }
            }
            report.valid_entries += 1;
        }
        Ok(report)
    }

    /// The newest heartbeat, if any.
    pub fn latest(&self) -> Result<Option<Heartbeat>, AttestError> {
        let beats: Vec<Heartbeat> = self
            .lock
            .with_lock(|| atomic::read_json_or_default(&self.path))?;
        Ok(beats.into_iter().last())
    }

    /// Sequence of the newest heartbeat, zero for an empty chain.
    pub fn sequence(&self) -> u64 {
        self.inner.read().sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use vaultward_types::identity::Role;

    fn manager(dir: &std::path::Path) -> (HeartbeatManager, String) {
        let state = StateDir::new(dir);
        state.ensure().unwrap();
        let host = LocalIdentity::generate(Role::Host).unwrap();
        let pk = host.public_key_hex();
        (HeartbeatManager::open(&state, host).unwrap(), pk)
    }

    #[test]
    fn chain_forms_and_verifies() {
        let dir = tempdir().unwrap();
        let (m, pk) = manager(dir.path());
        let first = m.beat(None).unwrap();
        assert_eq!(first.previous_hash, GENESIS_HASH);
        let second = m
            .beat(Some(SystemSummary {
                audit_chain_hash: "ab".repeat(32),
                audit_chain_seq: 12,
                snapshot_count: 3,
                total_bytes: 1 << 20,
                canary_status: "intact".into(),
            }))
            .unwrap();
        assert_eq!(second.previous_hash, first.content_hash);
        assert_eq!(second.audit_chain_seq, 12);

        let report = m.verify_chain(&pk).unwrap();
        assert!(report.valid);
        assert_eq!(report.total_entries, 2);
        assert_eq!(report.signed_entries, 2);
    }

    #[test]
    fn nonces_are_fresh_per_beat() {
        let dir = tempdir().unwrap();
        let (m, _) = manager(dir.path());
        let a = m.beat(None).unwrap();
        let b = m.beat(None).unwrap();
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn tampered_beat_breaks_chain() {
        let dir = tempdir().unwrap();
        let (m, pk) = manager(dir.path());
        m.beat(None).unwrap();
        m.beat(None).unwrap();

        let path = dir.path().join(dir::HEARTBEATS_FILE);
        let mut beats: Vec<Heartbeat> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        beats[0].snapshot_count = 999;
        std::fs::write(&path, serde_json::to_vec(&beats).unwrap()).unwrap();

        let report = m.verify_chain(&pk).unwrap();
        assert!(!report.valid);
        assert_eq!(report.first_broken_at, Some(0));
    }

    #[test]
    fn sequence_resumes_after_reopen() {
        let dir = tempdir().unwrap();
        let state = StateDir::new(dir.path());
        state.ensure().unwrap();
        let host = LocalIdentity::generate(Role::Host).unwrap();
        {
            let m = HeartbeatManager::open(&state, host.clone()).unwrap();
            m.beat(None).unwrap();
        }
        let m = HeartbeatManager::open(&state, host).unwrap();
        assert_eq!(m.sequence(), 1);
        let beat = m.beat(None).unwrap();
        assert_eq!(beat.sequence, 2);
    }
}
