//! Error types for policy, manifest, and audit operations.

use thiserror::Error;
use vaultward_crypto::CryptoError;
use vaultward_storage::StorageError;
use vaultward_types::error::{CodecError, ErrorCode};

/// Errors raised by the ledger managers.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A required signature is absent.
    #[error("Record is not signed: {0}")]
    NotSigned(String),
    /// A signature failed to verify; state was not mutated.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    /// A snapshot with this id is already registered.
    #[error("Duplicate snapshot: {0}")]
    DuplicateSnapshot(String),
    /// No snapshot with this id is registered.
    #[error("Unknown snapshot: {0}")]
    UnknownSnapshot(String),
    /// The stored Merkle root does not match the recomputed one.
    #[error("Merkle root mismatch: stored {stored}, computed {computed}")]
    MerkleMismatch {
        /// Root recorded in the manifest.
        stored: String,
        /// Root recomputed from the snapshot set.
        computed: String,
    },
    /// A proposed policy weakens the active append-only-locked contract.
    #[error("Policy replacement rejected: {0}")]
    PolicyWeakened(String),
    /// No active policy is in force.
    #[error("Policy not active: {0}")]
    PolicyNotActive(String),
    /// The signer is not a party to the contract.
    #[error("Unauthorized signer: {0}")]
    UnauthorizedSigner(String),
    /// Persistence failed; in-memory state matches the on-disk state.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A cryptographic operation failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// Canonical serialization failed.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The design forbids the state that was reached.
    #[error("Internal invariant violated: {0}")]
    Internal(String),
}

impl ErrorCode for LedgerError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotSigned(_) => "LEDGER_NOT_SIGNED",
            Self::InvalidSignature(_) => "LEDGER_INVALID_SIGNATURE",
            Self::DuplicateSnapshot(_) => "LEDGER_DUPLICATE_SNAPSHOT",
            Self::UnknownSnapshot(_) => "LEDGER_UNKNOWN_SNAPSHOT",
            Self::MerkleMismatch { .. } => "LEDGER_MERKLE_MISMATCH",
            Self::PolicyWeakened(_) => "LEDGER_POLICY_WEAKENED",
            Self::PolicyNotActive(_) => "LEDGER_POLICY_NOT_ACTIVE",
            Self::UnauthorizedSigner(_) => "LEDGER_UNAUTHORIZED_SIGNER",
            Self::Storage(_) => "LEDGER_STORAGE",
            Self::Crypto(_) => "LEDGER_CRYPTO",
            Self::Codec(_) => "LEDGER_CODEC",
            Self::Internal(_) => "LEDGER_INTERNAL",
        }
    }
}
