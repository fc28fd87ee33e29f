//! Liveness end to end: dead-man decay, witness fan-out, challenge round
//! trips.

use vaultward_attest::witness::CheckpointInputs;
use vaultward_attest::{
    AttestError, ChallengeManager, DeadManMonitor, HeartbeatManager, Witness, WitnessManager,
};
use vaultward_crypto::hash::sha256_hex;
use vaultward_test_utils::fixtures;
use vaultward_types::challenge::FileRequest;
use vaultward_types::heartbeat::{DeadManConfig, DeadManStatus};
use vaultward_types::time::unix_now;
use vaultward_types::witness::{WitnessCheckpoint, WitnessReceipt, WitnessVerification};

#[test]
fn deadman_cycle_with_heartbeat() {
    let (_guard, state) = fixtures::temp_state();
    let host = fixtures::host_identity();
    let heartbeats = HeartbeatManager::open(&state, host).unwrap();
    let monitor = DeadManMonitor::open(
        &state,
        DeadManConfig {
            expected_interval_secs: 1,
            grace_period_secs: 0,
            warning_threshold: 2,
            critical_threshold: 4,
            dead_threshold: 6,
        },
    )
    .unwrap();

    let t0 = 1_700_000_000;
    heartbeats.beat(None).unwrap();
    monitor.check_in_at(t0).unwrap();

    assert_eq!(monitor.evaluate_at(t0 + 3).unwrap(), DeadManStatus::Warning);
    assert_eq!(monitor.evaluate_at(t0 + 5).unwrap(), DeadManStatus::Critical);
    assert_eq!(monitor.evaluate_at(t0 + 7).unwrap(), DeadManStatus::Dead);

    let code = monitor.state().recovery_code;
    assert!(!code.is_empty());
    assert!(matches!(
        monitor.reset_at("0000", t0 + 8),
        Err(AttestError::RecoveryCodeMismatch)
    ));
    monitor.reset_at(&code, t0 + 8).unwrap();
    assert_eq!(monitor.state().status, DeadManStatus::Healthy);
    assert_eq!(monitor.state().missed_count, 0);
}

struct ScriptedWitness {
    name: &'static str,
    healthy: bool,
}

impl Witness for ScriptedWitness {
    fn name(&self) -> &str {
        self.name
    }

    fn submit(&self, checkpoint: &WitnessCheckpoint) -> Result<WitnessReceipt, AttestError> {
        if !self.healthy {
            return Err(AttestError::Witness {
                name: self.name.to_string(),
                reason: "http 500".into(),
            });
        }
        Ok(WitnessReceipt {
            checkpoint_id: checkpoint.id.clone(),
            witness_name: self.name.to_string(),
            received_at: unix_now(),
            status: "accepted".into(),
        })
    }

    fn verify(&self, checkpoint_id: &str) -> Result<WitnessVerification, AttestError> {
        Ok(WitnessVerification {
            checkpoint_id: checkpoint_id.to_string(),
            known: self.healthy,
            received_at: 0,
        })
    }

    fn ping(&self) -> Result<(), AttestError> {
        if self.healthy {
            Ok(())
        } else {
            Err(AttestError::Witness {
                name: self.name.to_string(),
                reason: "http 500".into(),
            })
        }
    }
}

#[test]
fn witness_fan_out_partial_success() {
    let host = fixtures::host_identity();
    let owner = fixtures::owner_identity();
    let manager = WitnessManager::new(vec![
        Box::new(ScriptedWitness {
            name: "w-healthy",
            healthy: true,
        }),
        Box::new(ScriptedWitness {
            name: "w-broken",
            healthy: false,
        }),
    ]);

    let checkpoint = WitnessManager::create_checkpoint(
        &host,
        &owner.key_id,
        CheckpointInputs {
            audit_chain_sequence: 7,
            audit_chain_hash: "aa".repeat(32),
            manifest_merkle_root: "bb".repeat(32),
            snapshot_count: 2,
            total_bytes: 2048,
            file_count: 11,
        },
    )
    .unwrap();

    let outcome = manager.submit_all(&checkpoint);
    assert_eq!(outcome.receipts.len(), 1);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.is_accepted());
    assert!(outcome.is_partial());
}

#[test]
fn challenge_round_trip_between_principals() {
    let (_owner_guard, owner_state) = fixtures::temp_state();
    let (_host_guard, host_state) = fixtures::temp_state();
    let data = tempfile::TempDir::new().unwrap();

    let owner = fixtures::owner_identity();
    let host = fixtures::host_identity();
    let owner_pk = owner.public_key_hex();
    let host_pk = host.public_key_hex();

    let owner_mgr = ChallengeManager::open(&owner_state, owner).unwrap();
    let host_mgr = ChallengeManager::open(&host_state, host).unwrap();

    let content = b"the backup bytes".to_vec();
    std::fs::write(data.path().join("backup.tar"), &content).unwrap();

    let challenge = owner_mgr
        .create_challenge(
            vec![FileRequest {
                path: "backup.tar".into(),
                expected_hash: sha256_hex(&content),
            }],
            3600,
        )
        .unwrap();

    let response = host_mgr.respond(&challenge, &owner_pk, data.path()).unwrap();
    let verdict = ChallengeManager::verify_response(&challenge, &response, &host_pk).unwrap();
    assert!(verdict.valid);

    // One flipped byte on the Host flips exactly one proof to a mismatch.
    std::fs::write(data.path().join("backup.tar"), b"the backup byteZ").unwrap();
    let second = owner_mgr
        .create_challenge(
            vec![FileRequest {
                path: "backup.tar".into(),
                expected_hash: sha256_hex(&content),
            }],
            3600,
        )
        .unwrap();
    let response = host_mgr.respond(&second, &owner_pk, data.path()).unwrap();
    let verdict = ChallengeManager::verify_response(&second, &response, &host_pk).unwrap();
    assert!(!verdict.valid);
    assert_eq!(verdict.mismatched.len(), 1);
    assert!(verdict.missing.is_empty());
    assert!(verdict.errored.is_empty());
}
