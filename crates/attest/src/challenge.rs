//! Per-file retrievability challenges.
//!
//! Single-shot per challenge: the Owner creates and signs, the Host
//! verifies and responds exactly once, the Owner verifies the response.
//! Replay is precluded by challenge ids and expiry.

use crate::error::AttestError;
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use vaultward_crypto::hash::sha256_hex;
use vaultward_crypto::key_store::LocalIdentity;
use vaultward_crypto::{nonce, sign};
use vaultward_storage::{atomic, dir, FileLock, StateDir};
use vaultward_types::challenge::{
    Challenge, ChallengeResponse, ChallengeVerification, FileProof, FileRequest,
};
use vaultward_types::time::unix_now;

#[derive(Default)]
struct ChallengeState {
    challenges: Vec<Challenge>,
    responses: Vec<ChallengeResponse>,
}

/// Owns the persisted challenge and response logs for one principal.
pub struct ChallengeManager {
    challenges_path: PathBuf,
    responses_path: PathBuf,
    challenges_lock: FileLock,
    responses_lock: FileLock,
    identity: LocalIdentity,
    inner: RwLock<ChallengeState>,
}

impl ChallengeManager {
    /// Opens the challenge store in `state` for the local identity.
    pub fn open(state: &StateDir, identity: LocalIdentity) -> Result<Self, AttestError> {
        let challenges_path = state.file(dir::CHALLENGES_FILE);
        let responses_path = state.file(dir::CHALLENGE_RESPONSES_FILE);
        let challenges: Vec<Challenge> = atomic::read_json_or_default(&challenges_path)?;
        let responses: Vec<ChallengeResponse> = atomic::read_json_or_default(&responses_path)?;
        Ok(Self {
            challenges_lock: FileLock::new(&challenges_path),
            responses_lock: FileLock::new(&responses_path),
            challenges_path,
            responses_path,
            identity,
            inner: RwLock::new(ChallengeState {
                challenges,
                responses,
            }),
        })
    }

    fn persist_challenges(&self, challenges: &[Challenge]) -> Result<(), AttestError> {
        self.challenges_lock
            .with_lock(|| atomic::write_json(&self.challenges_path, &challenges))?;
        Ok(())
    }

    fn persist_responses(&self, responses: &[ChallengeResponse]) -> Result<(), AttestError> {
        self.responses_lock
            .with_lock(|| atomic::write_json(&self.responses_path, &responses))?;
        Ok(())
    }

    /// Owner side: creates and signs a challenge over `requests`.
    pub fn create_challenge(
        &self,
        requests: Vec<FileRequest>,
        ttl_secs: i64,
    ) -> Result<Challenge, AttestError> {
        let now = unix_now();
        let mut sorted = requests;
        sorted.sort_by(|a, b| a.path.cmp(&b.path));
        let mut challenge = Challenge {
            id: nonce::random_id(),
            owner_key_id: self.identity.key_id.clone(),
            created_at: now,
            expires_at: now + ttl_secs,
            requests: sorted,
            owner_signature: String::new(),
        };
        let hash = challenge.signing_hash()?;
        challenge.owner_signature = self.identity.sign_hex(hash.as_bytes())?;

        let mut inner = self.inner.write();
        let mut challenges = inner.challenges.clone();
        challenges.push(challenge.clone());
        self.persist_challenges(&challenges)?;
        inner.challenges = challenges;
        tracing::info!(target: "challenge", id = %challenge.id, files = challenge.requests.len(), "challenge created");
        Ok(challenge)
    }

    /// Host side: verifies an incoming challenge and produces the signed
    /// response, reading each challenged file under `data_root`.
    pub fn respond(
        &self,
        challenge: &Challenge,
        owner_public_key_hex: &str,
        data_root: &Path,
    ) -> Result<ChallengeResponse, AttestError> {
        let hash = challenge.signing_hash()?;
        if !sign::verify_hex(owner_public_key_hex, hash.as_bytes(), &challenge.owner_signature) {
            return Err(AttestError::InvalidSignature(format!(
                "owner signature on challenge {}",
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

        let mut proofs: Vec<FileProof> = challenge
            .requests
            .iter()
            .map(|request| {
                let full = data_root.join(request.path.trim_start_matches('/'));
                match fs::read(&full) {
                    Ok(bytes) => FileProof {
                        path: request.path.clone(),
                        exists: true,
                        sha256: sha256_hex(&bytes),
                        size: bytes.len() as u64,
                        error: String::new(),
                    },
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileProof {
                        path: request.path.clone(),
                        exists: false,
                        sha256: String::new(),
                        size: 0,
                        error: String::new(),
                    },
                    Err(e) => FileProof {
                        path: request.path.clone(),
                        exists: false,
                        sha256: String::new(),
                        size: 0,
                        error: e.to_string(),
                    },
                }
            })
            .collect();
        proofs.sort_by(|a, b| a.path.cmp(&b.path));

        let mut response = ChallengeResponse {
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
        self.persist_responses(&responses)?;
        inner.responses = responses;
        Ok(response)
    }

    /// Owner side: verifies the Host signature, then classifies every
    /// proof against the challenge.
    pub fn verify_response(
        challenge: &Challenge,
        response: &ChallengeResponse,
        host_public_key_hex: &str,
    ) -> Result<ChallengeVerification, AttestError> {
        let hash = response.signing_hash()?;
        if !sign::verify_hex(host_public_key_hex, hash.as_bytes(), &response.host_signature) {
            return Err(AttestError::InvalidSignature(format!(
                "host signature on response to {}",
                response.challenge_id
            )));
        }

        let mut missing = Vec::new();
        let mut mismatched = Vec::new();
        let mut errored = Vec::new();
        for request in &challenge.requests {
            match response.proofs.iter().find(|p| p.path == request.path) {
                None => missing.push(request.path.clone()),
                Some(proof) if !proof.error.is_empty() => errored.push(request.path.clone()),
                Some(proof) if !proof.exists => missing.push(request.path.clone()),
                Some(proof) => {
                    if !request.expected_hash.is_empty() && proof.sha256 != request.expected_hash {
                        mismatched.push(request.path.clone());
                    }
                }
            }
        }
        let valid = missing.is_empty() && mismatched.is_empty() && errored.is_empty();
        Ok(ChallengeVerification {
            valid,
            missing,
            mismatched,
            errored,
        })
    }

    /// A challenge by id.
    pub fn get_challenge(&self, id: &str) -> Option<Challenge> {
        self.inner
            .read()
            .challenges
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    /// All known challenges.
    pub fn list_challenges(&self) -> Vec<Challenge> {
        self.inner.read().challenges.clone()
    }

    /// The recorded response to a challenge, if any.
    pub fn get_response(&self, challenge_id: &str) -> Option<ChallengeResponse> {
        self.inner
            .read()
            .responses
            .iter()
            .find(|r| r.challenge_id == challenge_id)
            .cloned()
    }
}
