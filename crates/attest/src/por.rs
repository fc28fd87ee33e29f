//! Block-level proof of retrievability.
//!
//! The Owner samples random blocks and binds a fresh nonce to each; the
//! Host must return `SHA-256(nonce ∥ block)` per block, which it can only
//! compute by reading the block after the challenge was issued. Owner-side
//! verification recomputes the combined hashes from the source data.

use crate::error::AttestError;
use parking_lot::RwLock;
use rand::rngs::OsRng;
use rand::Rng;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use vaultward_crypto::hash::{sha256_hex, sha256_with_nonce};
use vaultward_crypto::key_store::LocalIdentity;
use vaultward_crypto::{nonce, sign};
use vaultward_storage::{atomic, dir, FileLock, StateDir};
use vaultward_types::challenge::{
    PorBlockChallenge, PorBlockProof, PorChallenge, PorResponse, PorVerification,
};
use vaultward_types::time::unix_now;

/// Default challenged-block size in bytes.
pub const DEFAULT_BLOCK_SIZE: u64 = 64 * 1024;

#[derive(Default)]
struct PorState {
    challenges: Vec<PorChallenge>,
    responses: Vec<PorResponse>,
}

/// Owns the persisted PoR challenge and response logs.
pub struct PorManager {
    challenges_path: PathBuf,
    responses_path: PathBuf,
    challenges_lock: FileLock,
    responses_lock: FileLock,
    identity: LocalIdentity,
    inner: RwLock<PorState>,
}

impl PorManager {
    /// Opens the PoR store in `state` for the local identity.
    pub fn open(state: &StateDir, identity: LocalIdentity) -> Result<Self, AttestError> {
        let challenges_path = state.file(dir::POR_CHALLENGES_FILE);
        let responses_path = state.file(dir::POR_RESPONSES_FILE);
        let challenges: Vec<PorChallenge> = atomic::read_json_or_default(&challenges_path)?;
        let responses: Vec<PorResponse> = atomic::read_json_or_default(&responses_path)?;
        Ok(Self {
            challenges_lock: FileLock::new(&challenges_path),
            responses_lock: FileLock::new(&responses_path),
            challenges_path,
            responses_path,
            identity,
            inner: RwLock::new(PorState {
                challenges,
                responses,
            }),
        })
    }

    /// Owner side: samples up to `blocks_per_file` random blocks from each
    /// `(path, file_size)` pair and signs the challenge.
    pub fn create_challenge(
        &self,
        files: &[(String, u64)],
        block_size: u64,
        blocks_per_file: usize,
        ttl_secs: i64,
    ) -> Result<PorChallenge, AttestError> {
        let now = unix_now();
        let mut blocks = Vec::new();
        for (path, file_size) in files {
            let block_count = file_size.div_ceil(block_size).max(1);
            let mut chosen = BTreeSet::new();
            // Distinct indices; when the file has few blocks, take them all.
            if block_count as usize <= blocks_per_file {
                chosen.extend(0..block_count);
            } else {
                while chosen.len() < blocks_per_file {
                    chosen.insert(OsRng.gen_range(0..block_count));
                }
            }
            for index in chosen {
                let offset = index * block_size;
                let length = block_size.min(file_size.saturating_sub(offset)).max(1);
                blocks.push(PorBlockChallenge {
                    path: path.clone(),
                    block_index: index,
                    offset,
                    length,
                    nonce: nonce::random_nonce(),
                });
            }
        }
        blocks.sort_by(|a, b| (&a.path, a.block_index).cmp(&(&b.path, b.block_index)));

        let mut challenge = PorChallenge {
            id: nonce::random_id(),
            owner_key_id: self.identity.key_id.clone(),
            created_at: now,
            expires_at: now + ttl_secs,
            blocks,
            owner_signature: String::new(),
        };
        let hash = challenge.signing_hash()?;
        challenge.owner_signature = self.identity.sign_hex(hash.as_bytes())?;

        let mut inner = self.inner.write();
        let mut challenges = inner.challenges.clone();
        challenges.push(challenge.clone());
        self.challenges_lock
            .with_lock(|| atomic::write_json(&self.challenges_path, &challenges))?;
        inner.challenges = challenges;
        tracing::info!(target: "por", id = %challenge.id, blocks = challenge.blocks.len(), "PoR challenge created");
        Ok(challenge)
    }

    fn read_block(data_root: &Path, block: &PorBlockChallenge) -> Result<Vec<u8>, String> {
        let full = data_root.join(block.path.trim_start_matches('/'));
        let mut file = File::open(&full).map_err(|e| e.to_string())?;
        file.seek(SeekFrom::Start(block.offset))
            .map_err(|e| e.to_string())?;
        let mut buf = vec![0u8; block.length as usize];
        let mut read = 0;
        while read < buf.len() {
            match file.read(&mut buf[read..]).map_err(|e| e.to_string())? {
                0 => break,
                n => read += n,
            }
        }
        buf.truncate(read);
        Ok(buf)
    }

    fn decode_nonce(block: &PorBlockChallenge) -> Result<Vec<u8>, AttestError> {
        hex::decode(&block.nonce).map_err(|e| AttestError::DataRead {
            path: block.path.clone(),
            reason: format!("malformed nonce: {}", e),
        })
    }

    /// Host side: verifies the challenge, reads every challenged block,
    /// and returns the signed proof set.
    pub fn respond(
        &self,
        challenge: &PorChallenge,
        owner_public_key_hex: &str,
        data_root: &Path,
    ) -> Result<PorResponse, AttestError> {
        let hash = challenge.signing_hash()?;
        if !sign::verify_hex(owner_public_key_hex, hash.as_bytes(), &challenge.owner_signature) {
            return Err(AttestError::InvalidSignature(format!(
                "owner signature on PoR challenge {}",
                challenge.id
            )));
        }
        let now = unix_now();
        if challenge.is_expired_at(now) {
            return Err(AttestError::Expired(challenge.id.clone()));
        }
        {
            let inner = self.inner.read();
            if inner.responses.iter().any(|r| r.challenge_id == challenge.id) {
                return Err(AttestError::AlreadyResponded(challenge.id.clone()));
            }
        }

        let mut proofs = Vec::with_capacity(challenge.blocks.len());
        for block in &challenge.blocks {
            let proof = match Self::read_block(data_root, block) {
                Ok(bytes) => {
                    let nonce_bytes = Self::decode_nonce(block)?;
                    PorBlockProof {
                        path: block.path.clone(),
                        block_index: block.block_index,
                        block_hash: sha256_hex(&bytes),
                        combined_hash: hex::encode(sha256_with_nonce(&nonce_bytes, &bytes)),
                        error: String::new(),
                    }
                }
                Err(reason) => PorBlockProof {
                    path: block.path.clone(),
                    block_index: block.block_index,
                    block_hash: String::new(),
                    combined_hash: String::new(),
                    error: reason,
                },
            };
            proofs.push(proof);
        }

        let mut response = PorResponse {
            challenge_id: challenge.id.clone(),
            host_key_id: self.identity.key_id.clone(),
            responded_at: now,
            proofs,
            host_signature: String::new(),
        };
        let hash = response.signing_hash()?;
        response.host_signature = self.identity.sign_hex(hash.as_bytes())?;

        let mut inner = self.inner.write();
        let mut responses = inner.responses.clone();
        responses.push(response.clone());
        self.responses_lock
            .with_lock(|| atomic::write_json(&self.responses_path, &responses))?;
        inner.responses = responses;
        Ok(response)
    }

    /// Owner side: verifies the Host signature and recomputes every
    /// combined hash from the source data.
    pub fn verify_response(
        challenge: &PorChallenge,
        response: &PorResponse,
        host_public_key_hex: &str,
        data_root: &Path,
    ) -> Result<PorVerification, AttestError> {
        let hash = response.signing_hash()?;
        if !sign::verify_hex(host_public_key_hex, hash.as_bytes(), &response.host_signature) {
            return Err(AttestError::InvalidSignature(format!(
                "host signature on PoR response to {}",
                response.challenge_id
            )));
        }

        let mut failed = Vec::new();
        let mut errored = Vec::new();
        for block in &challenge.blocks {
            let label = format!("{}#{}", block.path, block.block_index);
            let proof = response
                .proofs
                .iter()
                .find(|p| p.path == block.path && p.block_index == block.block_index);
            let Some(proof) = proof else {
                failed.push(label);
                continue;
            };
            if !proof.error.is_empty() {
                errored.push(label);
                continue;
            }
            let bytes = Self::read_block(data_root, block).map_err(|reason| {
                AttestError::DataRead {
                    path: block.path.clone(),
                    reason,
                }
            })?;
            let nonce_bytes = Self::decode_nonce(block)?;
            let expected = hex::encode(sha256_with_nonce(&nonce_bytes, &bytes));
            if proof.combined_hash != expected {
                failed.push(label);
            }
        }
        let valid = failed.is_empty() && errored.is_empty();
        Ok(PorVerification {
            valid,
            failed_blocks: failed,
            errored_blocks: errored,
        })
    }

    /// A PoR challenge by id.
    pub fn get_challenge(&self, id: &str) -> Option<PorChallenge> {
        self.inner
            .read()
            .challenges
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use vaultward_types::identity::Role;

    struct Fixture {
        _owner_dir: tempfile::TempDir,
        _host_dir: tempfile::TempDir,
        data_dir: tempfile::TempDir,
        owner_mgr: PorManager,
        host_mgr: PorManager,
        owner_pk: String,
        host_pk: String,
    }

    fn fixture() -> Fixture {
        let owner_dir = tempdir().unwrap();
        let host_dir = tempdir().unwrap();
        let data_dir = tempdir().unwrap();
        let owner = LocalIdentity::generate(Role::Owner).unwrap();
        let host = LocalIdentity::generate(Role::Host).unwrap();
        let owner_pk = owner.public_key_hex();
        let host_pk = host.public_key_hex();
        let owner_state = StateDir::new(owner_dir.path());
        owner_state.ensure().unwrap();
        let host_state = StateDir::new(host_dir.path());
        host_state.ensure().unwrap();
        Fixture {
            owner_mgr: PorManager::open(&owner_state, owner).unwrap(),
            host_mgr: PorManager::open(&host_state, host).unwrap(),
            _owner_dir: owner_dir,
            _host_dir: host_dir,
            data_dir,
            owner_pk,
            host_pk,
        }
    }

    #[test]
    fn fresh_read_proof_verifies() {
        let f = fixture();
        let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(f.data_dir.path().join("big.bin"), &content).unwrap();

        let challenge = f
            .owner_mgr
            .create_challenge(&[("big.bin".into(), content.len() as u64)], 4096, 5, 3600)
            .unwrap();
        assert!(!challenge.blocks.is_empty());
        assert!(challenge.blocks.len() <= 5);

        let response = f
            .host_mgr
            .respond(&challenge, &f.owner_pk, f.data_dir.path())
            .unwrap();
        let verdict = PorManager::verify_response(
            &challenge,
            &response,
            &f.host_pk,
            f.data_dir.path(),
        )
        .unwrap();
        assert!(verdict.valid);
    }

    #[test]
    fn stale_proof_fails_verification() {
        let f = fixture();
        let content = vec![7u8; 50_000];
        let path = f.data_dir.path().join("data.bin");
        std::fs::write(&path, &content).unwrap();

        let challenge = f
            .owner_mgr
            .create_challenge(&[("data.bin".into(), content.len() as u64)], 4096, 3, 3600)
            .unwrap();
        let mut response = f
            .host_mgr
            .respond(&challenge, &f.owner_pk, f.data_dir.path())
            .unwrap();

        // Forge one combined hash; the signature breaks, as it must.
        response.proofs[0].combined_hash = "00".repeat(32);
        assert!(matches!(
            PorManager::verify_response(&challenge, &response, &f.host_pk, f.data_dir.path()),
            Err(AttestError::InvalidSignature(_))
        ));
    }

    #[test]
    fn host_with_altered_data_fails() {
        let f = fixture();
        let content = vec![9u8; 30_000];
        let path = f.data_dir.path().join("data.bin");
        std::fs::write(&path, &content).unwrap();

        let challenge = f
            .owner_mgr
            .create_challenge(&[("data.bin".into(), content.len() as u64)], 4096, 3, 3600)
            .unwrap();

        // The Host's copy diverges wholesale after the challenge is issued.
        let altered = vec![0xEEu8; content.len()];
        let host_data = tempdir().unwrap();
        std::fs::write(host_data.path().join("data.bin"), &altered).unwrap();

        let response = f
            .host_mgr
            .respond(&challenge, &f.owner_pk, host_data.path())
            .unwrap();
        let verdict = PorManager::verify_response(
            &challenge,
            &response,
            &f.host_pk,
            f.data_dir.path(),
        )
        .unwrap();
        assert!(!verdict.valid);
        assert_eq!(verdict.failed_blocks.len(), challenge.blocks.len());
    }

    #[test]
    fn small_file_takes_all_blocks() {
        let f = fixture();
        let content = vec![1u8; 100];
        std::fs::write(f.data_dir.path().join("small.bin"), &content).unwrap();
        let challenge = f
            .owner_mgr
            .create_challenge(&[("small.bin".into(), 100)], 4096, 5, 3600)
            .unwrap();
        assert_eq!(challenge.blocks.len(), 1);
        assert_eq!(challenge.blocks[0].length, 100);
    }
}
