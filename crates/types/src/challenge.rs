//! Retrievability challenges over storage contents.
//!
//! Two patterns share the single-shot receive → respond → verify shape:
//! per-file challenges hashing whole files, and block-level PoR challenges
//! whose fresh per-block nonces prove the block was read at challenge time.

use crate::canonical::hash_view;
use crate::error::CodecError;
use serde::{Deserialize, Serialize};

/// One file the Owner wants proven present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRequest {
    /// Path relative to the Host's data root.
    pub path: String,
    /// Expected SHA-256 of the file content, empty when unknown.
    #[serde(default)]
    pub expected_hash: String,
}

/// An Owner-signed per-file challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    /// Random 8-byte hex id.
    pub id: String,
    /// Stable key id of the issuing Owner.
    pub owner_key_id: String,
    /// Unix seconds at creation.
    pub created_at: i64,
    /// Unix seconds after which responses are rejected.
    pub expires_at: i64,
    /// Files to prove, sorted by path before signing.
    pub requests: Vec<FileRequest>,
    /// Owner signature over the canonical hash, lowercase hex.
    #[serde(default)]
    pub owner_signature: String,
}

/// The Host's proof for one challenged file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileProof {
    /// Challenged path.
    pub path: String,
    /// Whether the file exists.
    pub exists: bool,
    /// SHA-256 of the file content, empty when absent.
    #[serde(default)]
    pub sha256: String,
    /// File size in bytes, zero when absent.
    #[serde(default)]
    pub size: u64,
    /// Read error text, empty when none.
    #[serde(default)]
    pub error: String,
}

/// A Host-signed response to a per-file challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeResponse {
    /// Id of the challenge being answered.
    pub challenge_id: String,
    /// Stable key id of the responding Host.
    pub host_key_id: String,
    /// Unix seconds at which the response was produced.
    pub responded_at: i64,
    /// Per-file proofs, sorted by path before signing.
    pub proofs: Vec<FileProof>,
    /// Host signature over the canonical hash, lowercase hex.
    #[serde(default)]
    pub host_signature: String,
}

/// Per-path verdicts from verifying a challenge response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeVerification {
    /// Overall verdict: no missing files, no mismatches, no transport
    /// errors.
    pub valid: bool,
    /// Paths the Host reported absent.
    pub missing: Vec<String>,
    /// Paths whose returned hash differs from the expected hash.
    pub mismatched: Vec<String>,
    /// Paths whose proof carried a read error.
    pub errored: Vec<String>,
}

/// Per-block verdicts from verifying a PoR response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PorVerification {
    /// Overall verdict: every challenged block proved a fresh read.
    pub valid: bool,
    /// `path#index` labels of blocks whose combined hash did not match.
    pub failed_blocks: Vec<String>,
    /// `path#index` labels of blocks the Host reported errors for.
    pub errored_blocks: Vec<String>,
}

/// One challenged block with its fresh nonce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PorBlockChallenge {
    /// Path relative to the Host's data root.
    pub path: String,
    /// Zero-based block index within the file.
    pub block_index: u64,
    /// Byte offset of the block.
    pub offset: u64,
    /// Block length in bytes.
    pub length: u64,
    /// Fresh 16-byte nonce, lowercase hex, signed into the challenge.
    pub nonce: String,
}

/// An Owner-signed block-level retrievability challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PorChallenge {
    /// Random 8-byte hex id.
    pub id: String,
    /// Stable key id of the issuing Owner.
    pub owner_key_id: String,
    /// Unix seconds at creation.
    pub created_at: i64,
    /// Unix seconds after which responses are rejected.
    pub expires_at: i64,
    /// Challenged blocks, sorted by `(path, block_index)` before signing.
    pub blocks: Vec<PorBlockChallenge>,
    /// Owner signature over the canonical hash, lowercase hex.
    #[serde(default)]
    pub owner_signature: String,
}

/// The Host's proof for one challenged block.
///
/// `combined_hash = SHA-256(nonce bytes ∥ block bytes)` proves a fresh read,
/// since the nonce was generated at challenge time and signed into the
/// challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PorBlockProof {
    /// Challenged path.
    pub path: String,
    /// Zero-based block index within the file.
    pub block_index: u64,
    /// SHA-256 of the block bytes alone.
    #[serde(default)]
    pub block_hash: String,
    /// SHA-256 of nonce bytes followed by block bytes.
    #[serde(default)]
    pub combined_hash: String,
    /// Read error text, empty when none.
    #[serde(default)]
    pub error: String,
}

/// A Host-signed response to a PoR challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PorResponse {
    /// Id of the challenge being answered.
    pub challenge_id: String,
    /// Stable key id of the responding Host.
    pub host_key_id: String,
    /// Unix seconds at which the response was produced.
    pub responded_at: i64,
    /// Per-block proofs, sorted by `(path, block_index)` before signing.
    pub proofs: Vec<PorBlockProof>,
    /// Host signature over the canonical hash, lowercase hex.
    #[serde(default)]
    pub host_signature: String,
}

#[derive(Serialize)]
struct FileRequestView<'a> {
    path: &'a str,
    expected_hash: &'a str,
}

#[derive(Serialize)]
struct ChallengeSigningView<'a> {
    id: &'a str,
    owner_key_id: &'a str,
    created_at: i64,
    expires_at: i64,
    requests: Vec<FileRequestView<'a>>,
}

#[derive(Serialize)]
struct FileProofView<'a> {
    path: &'a str,
    exists: bool,
    sha256: &'a str,
    size: u64,
    error: &'a str,
}

#[derive(Serialize)]
struct ResponseSigningView<'a> {
    challenge_id: &'a str,
    host_key_id: &'a str,
    responded_at: i64,
    proofs: Vec<FileProofView<'a>>,
}

#[derive(Serialize)]
struct PorBlockView<'a> {
    path: &'a str,
    block_index: u64,
    offset: u64,
    length: u64,
    nonce: &'a str,
}

#[derive(Serialize)]
struct PorChallengeSigningView<'a> {
    id: &'a str,
    owner_key_id: &'a str,
    created_at: i64,
    expires_at: i64,
    blocks: Vec<PorBlockView<'a>>,
}

#[derive(Serialize)]
struct PorProofView<'a> {
    path: &'a str,
    block_index: u64,
    block_hash: &'a str,
    combined_hash: &'a str,
}

#[derive(Serialize)]
struct PorResponseSigningView<'a> {
    challenge_id: &'a str,
    host_key_id: &'a str,
    responded_at: i64,
    proofs: Vec<PorProofView<'a>>,
}

impl Challenge {
    /// The canonical hash the Owner signs, requests sorted by path.
    pub fn signing_hash(&self) -> Result<String, CodecError> {
        let mut requests: Vec<&FileRequest> = self.requests.iter().collect();
        requests.sort_by(|a, b| a.path.cmp(&b.path));
        hash_view(&ChallengeSigningView {
            id: &self.id,
            owner_key_id: &self.owner_key_id,
            created_at: self.created_at,
            expires_at: self.expires_at,
            requests: requests
                .into_iter()
                .map(|r| FileRequestView {
                    path: &r.path,
                    expected_hash: &r.expected_hash,
                })
                .collect(),
        })
    }

    /// Whether the challenge has lapsed at `now`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at > 0 && now > self.expires_at
    }
}

impl ChallengeResponse {
    /// The canonical hash the Host signs, proofs sorted by path.
    pub fn signing_hash(&self) -> Result<String, CodecError> {
        let mut proofs: Vec<&FileProof> = self.proofs.iter().collect();
        proofs.sort_by(|a, b| a.path.cmp(&b.path));
        hash_view(&ResponseSigningView {
            challenge_id: &self.challenge_id,
            host_key_id: &self.host_key_id,
            responded_at: self.responded_at,
            proofs: proofs
                .into_iter()
                .map(|p| FileProofView {
                    path: &p.path,
                    exists: p.exists,
                    sha256: &p.sha256,
                    size: p.size,
                    error: &p.error,
                })
                .collect(),
        })
    }
}

impl PorChallenge {
    /// The canonical hash the Owner signs, blocks sorted by
    /// `(path, block_index)`.
    pub fn signing_hash(&self) -> Result<String, CodecError> {
        let mut blocks: Vec<&PorBlockChallenge> = self.blocks.iter().collect();
        blocks.sort_by(|a, b| (&a.path, a.block_index).cmp(&(&b.path, b.block_index)));
        hash_view(&PorChallengeSigningView {
            id: &self.id,
            owner_key_id: &self.owner_key_id,
            created_at: self.created_at,
            expires_at: self.expires_at,
            blocks: blocks
                .into_iter()
                .map(|b| PorBlockView {
                    path: &b.path,
                    block_index: b.block_index,
                    offset: b.offset,
                    length: b.length,
                    nonce: &b.nonce,
                })
                .collect(),
        })
    }

    /// Whether the challenge has lapsed at `now`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at > 0 && now > self.expires_at
    }
}

impl PorResponse {
    /// The canonical hash the Host signs, proofs sorted by
    /// `(path, block_index)`.
    pub fn signing_hash(&self) -> Result<String, CodecError> {
        let mut proofs: Vec<&PorBlockProof> = self.proofs.iter().collect();
        proofs.sort_by(|a, b| (&a.path, a.block_index).cmp(&(&b.path, b.block_index)));
        hash_view(&PorResponseSigningView {
            challenge_id: &self.challenge_id,
            host_key_id: &self.host_key_id,
            responded_at: self.responded_at,
            proofs: proofs
                .into_iter()
                .map(|p| PorProofView {
                    path: &p.path,
                    block_index: p.block_index,
                    block_hash: &p.block_hash,
                    combined_hash: &p.combined_hash,
                })
                .collect(),
        })
    }
}
