//! External witnesses and checkpoint fan-out.
//!
//! A witness is a capability set `{submit, verify, ping, name}` behind a
//! trait object chosen at construction; nothing downstream inspects the
//! concrete type. The manager fans a checkpoint out to every configured
//! witness and reports receipts and failures together; one acceptance is
//! partial success, not an error.

mod http;

pub use http::{HttpFlavor, HttpWitness};

use crate::error::AttestError;
use vaultward_crypto::key_store::LocalIdentity;
use vaultward_crypto::{nonce, sign};
use vaultward_types::time::unix_now;
use vaultward_types::witness::{
    SubmissionOutcome, WitnessCheckpoint, WitnessReceipt, WitnessVerification,
};

/// An independent third party that can attest a checkpoint existed when
/// submitted.
pub trait Witness: Send + Sync {
    /// Stable display name used in receipts and error reports.
    fn name(&self) -> &str;

    /// Submits a checkpoint, returning the witness's receipt.
    fn submit(&self, checkpoint: &WitnessCheckpoint) -> Result<WitnessReceipt, AttestError>;

    /// Asks whether the witness knows a previously submitted checkpoint.
    fn verify(&self, checkpoint_id: &str) -> Result<WitnessVerification, AttestError>;

    /// Cheap health probe.
    fn ping(&self) -> Result<(), AttestError>;
}

/// Inputs summarized into a checkpoint.
#[derive(Debug, Clone, Default)]
pub struct CheckpointInputs {
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
    /// Number of stored files.
    pub file_count: u64,
}

/// Fans checkpoints out to every configured witness.
pub struct WitnessManager {
    witnesses: Vec<Box<dyn Witness>>,
}

impl WitnessManager {
    /// An empty manager; witnesses are added at construction time.
    pub fn new(witnesses: Vec<Box<dyn Witness>>) -> Self {
        Self { witnesses }
    }

    /// Builds and Host-signs a checkpoint. The Owner key id is fixed here
    /// so a later countersignature covers the same canonical hash.
    pub fn create_checkpoint(
        host: &LocalIdentity,
        owner_key_id: &str,
        inputs: CheckpointInputs,
    ) -> Result<WitnessCheckpoint, AttestError> {
        let mut checkpoint = WitnessCheckpoint {
            id: nonce::random_id(),
            created_at: unix_now(),
            audit_chain_sequence: inputs.audit_chain_sequence,
            audit_chain_hash: inputs.audit_chain_hash,
            manifest_merkle_root: inputs.manifest_merkle_root,
            snapshot_count: inputs.snapshot_count,
            total_bytes: inputs.total_bytes,
            file_count: inputs.file_count,
            host_key_id: host.key_id.clone(),
            host_signature: String::new(),
            owner_key_id: owner_key_id.to_string(),
            owner_signature: String::new(),
        };
        let hash = checkpoint.signing_hash()?;
        checkpoint.host_signature = host.sign_hex(hash.as_bytes())?;
        Ok(checkpoint)
    }

    /// Applies the Owner countersignature over the same canonical hash.
    pub fn countersign(
        checkpoint: &mut WitnessCheckpoint,
        owner: &LocalIdentity,
    ) -> Result<(), AttestError> {
        if owner.key_id != checkpoint.owner_key_id {
            return Err(AttestError::InvalidSignature(format!(
                "checkpoint {} names owner {}, not {}",
                checkpoint.id, checkpoint.owner_key_id, owner.key_id
            )));
        }
        let hash = checkpoint.signing_hash()?;
        checkpoint.owner_signature = owner.sign_hex(hash.as_bytes())?;
        Ok(())
    }

    /// Verifies the Host signature (and the Owner countersignature when
    /// present) over a checkpoint.
    pub fn verify_checkpoint(
        checkpoint: &WitnessCheckpoint,
        host_public_key_hex: &str,
        owner_public_key_hex: Option<&str>,
    ) -> Result<(), AttestError> {
        let hash = checkpoint.signing_hash()?;
        if !sign::verify_hex(host_public_key_hex, hash.as_bytes(), &checkpoint.host_signature) {
            return Err(AttestError::InvalidSignature(format!(
                "host signature on checkpoint {}",
                checkpoint.id
            )));
        }
        if !checkpoint.owner_signature.is_empty() {
            let owner_pk = owner_public_key_hex.ok_or_else(|| {
                AttestError::InvalidSignature(format!(
                    "checkpoint {} is countersigned but no owner key was supplied",
                    checkpoint.id
                ))
            })?;
            if !sign::verify_hex(owner_pk, hash.as_bytes(), &checkpoint.owner_signature) {
                return Err(AttestError::InvalidSignature(format!(
                    "owner signature on checkpoint {}",
                    checkpoint.id
                )));
            }
        }
        Ok(())
    }

    /// Submits to every witness, aggregating receipts and failures.
    /// Cancellation mid-fan-out does not roll back earlier submissions.
    pub fn submit_all(&self, checkpoint: &WitnessCheckpoint) -> SubmissionOutcome {
        let mut receipts = Vec::new();
        let mut errors = Vec::new();
        for witness in &self.witnesses {
            match witness.submit(checkpoint) {
                Ok(receipt) => receipts.push(receipt),
                Err(e) => {
                    tracing::warn!(target: "witness", name = witness.name(), "submission failed: {}", e);
                    errors.push(format!("{}: {}", witness.name(), e));
                }
            }
        }
        SubmissionOutcome { receipts, errors }
    }

    /// Asks every witness about a checkpoint id.
    pub fn verify_all(&self, checkpoint_id: &str) -> Vec<(String, Result<WitnessVerification, AttestError>)> {
        self.witnesses
            .iter()
            .map(|w| (w.name().to_string(), w.verify(checkpoint_id)))
            .collect()
    }

    /// Pings every witness, returning the names of the reachable ones.
    pub fn ping_all(&self) -> Vec<(String, bool)> {
        self.witnesses
            .iter()
            .map(|w| (w.name().to_string(), w.ping().is_ok()))
            .collect()
    }

    /// Number of configured witnesses.
    pub fn len(&self) -> usize {
        self.witnesses.len()
    }

    /// Whether no witnesses are configured.
    pub fn is_empty(&self) -> bool {
        self.witnesses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultward_types::identity::Role;

    struct FixedWitness {
        name: String,
        fail: bool,
    }

    impl Witness for FixedWitness {
        fn name(&self) -> &str {
            &self.name
        }

        fn submit(&self, checkpoint: &WitnessCheckpoint) -> Result<WitnessReceipt, AttestError> {
            if self.fail {
                return Err(AttestError::Witness {
                    name: self.name.clone(),
                    reason: "http 500".into(),
                });
            }
            Ok(WitnessReceipt {
                checkpoint_id: checkpoint.id.clone(),
                witness_name: self.name.clone(),
                received_at: unix_now(),
                status: "accepted".into(),
            })
        }

        fn verify(&self, checkpoint_id: &str) -> Result<WitnessVerification, AttestError> {
            Ok(WitnessVerification {
                checkpoint_id: checkpoint_id.to_string(),
                known: !self.fail,
                received_at: 0,
            })
        }

        fn ping(&self) -> Result<(), AttestError> {
            if self.fail {
                Err(AttestError::Witness {
                    name: self.name.clone(),
                    reason: "unreachable".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn checkpoint(host: &LocalIdentity, owner: &LocalIdentity) -> WitnessCheckpoint {
        WitnessManager::create_checkpoint(
            host,
            &owner.key_id,
            CheckpointInputs {
                audit_chain_sequence: 42,
                audit_chain_hash: "ab".repeat(32),
                manifest_merkle_root: "cd".repeat(32),
                snapshot_count: 3,
                total_bytes: 1 << 30,
                file_count: 100,
            },
        )
        .unwrap()
    }

    #[test]
    fn partial_fan_out_is_partial_success() {
        let host = LocalIdentity::generate(Role::Host).unwrap();
        let owner = LocalIdentity::generate(Role::Owner).unwrap();
        let manager = WitnessManager::new(vec![
            Box::new(FixedWitness {
                name: "healthy".into(),
                fail: false,
            }),
            Box::new(FixedWitness {
                name: "broken".into(),
                fail: true,
            }),
        ]);
        let cp = checkpoint(&host, &owner);
        let outcome = manager.submit_all(&cp);
        assert_eq!(outcome.receipts.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.is_accepted());
        assert!(outcome.is_partial());
        assert!(outcome.errors[0].starts_with("broken:"));
    }

    #[test]
    fn checkpoint_signatures_cover_one_hash() {
        let host = LocalIdentity::generate(Role::Host).unwrap();
        let owner = LocalIdentity::generate(Role::Owner).unwrap();
        let mut cp = checkpoint(&host, &owner);

        WitnessManager::verify_checkpoint(&cp, &host.public_key_hex(), None).unwrap();
        WitnessManager::countersign(&mut cp, &owner).unwrap();
        WitnessManager::verify_checkpoint(
            &cp,
            &host.public_key_hex(),
            Some(&owner.public_key_hex()),
        )
        .unwrap();

        // The countersignature must not have invalidated the host's.
        cp.audit_chain_sequence += 1;
        assert!(WitnessManager::verify_checkpoint(&cp, &host.public_key_hex(), None).is_err());
    }

    #[test]
    fn stranger_cannot_countersign() {
        let host = LocalIdentity::generate(Role::Host).unwrap();
        let owner = LocalIdentity::generate(Role::Owner).unwrap();
        let stranger = LocalIdentity::generate(Role::Owner).unwrap();
        let mut cp = checkpoint(&host, &owner);
        assert!(WitnessManager::countersign(&mut cp, &stranger).is_err());
    }

    #[test]
    fn ping_and_verify_fan_out() {
        let manager = WitnessManager::new(vec![
            Box::new(FixedWitness {
                name: "a".into(),
                fail: false,
            }),
            Box::new(FixedWitness {
                name: "b".into(),
                fail: true,
            }),
        ]);
        let pings = manager.ping_all();
        assert_eq!(pings, vec![("a".to_string(), true), ("b".to_string(), false)]);
        let verifications = manager.verify_all("cp-1");
        assert_eq!(verifications.len(), 2);
    }
}
