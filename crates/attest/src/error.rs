//! Error types for challenges, heartbeats, the dead-man switch, and
//! witnesses.

use thiserror::Error;
use vaultward_crypto::CryptoError;
use vaultward_storage::StorageError;
use vaultward_types::error::{CodecError, ErrorCode};

/// Errors raised by the attestation managers.
#[derive(Debug, Error)]
pub enum AttestError {
    /// No challenge with this id is known.
    #[error("Unknown challenge: {0}")]
    UnknownChallenge(String),
    /// The challenge's deadline has passed.
    #[error("Challenge {0} has expired")]
    Expired(String),
    /// A signature failed to verify; nothing was mutated.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    /// A challenge was answered twice.
    #[error("Challenge {0} already has a response")]
    AlreadyResponded(String),
    /// Reading challenged data failed.
    #[error("Data read failed for {path}: {reason}")]
    DataRead {
        /// Path that could not be read.
        path: String,
        /// Why the read failed.
        reason: String,
    },
    /// The presented recovery code does not match the generated one.
    #[error("Recovery code mismatch")]
    RecoveryCodeMismatch,
    /// The dead-man switch is not in the state the operation requires.
    #[error("Dead-man switch is {0}")]
    WrongSwitchState(String),
    /// A witness endpoint could not be reached or answered abnormally.
    #[error("Witness {name} failed: {reason}")]
    Witness {
        /// Name of the failing witness.
        name: String,
        /// What went wrong.
        reason: String,
    },
    /// Persistence failed; in-memory state matches the on-disk state.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A cryptographic operation failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// Canonical serialization failed.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ErrorCode for AttestError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownChallenge(_) => "ATTEST_UNKNOWN_CHALLENGE",
            Self::Expired(_) => "ATTEST_EXPIRED",
            Self::InvalidSignature(_) => "ATTEST_INVALID_SIGNATURE",
            Self::AlreadyResponded(_) => "ATTEST_ALREADY_RESPONDED",
            Self::DataRead { .. } => "ATTEST_DATA_READ",
            Self::RecoveryCodeMismatch => "ATTEST_RECOVERY_CODE_MISMATCH",
            Self::WrongSwitchState(_) => "ATTEST_WRONG_SWITCH_STATE",
            Self::Witness { .. } => "ATTEST_WITNESS",
            Self::Storage(_) => "ATTEST_STORAGE",
            Self::Crypto(_) => "ATTEST_CRYPTO",
            Self::Codec(_) => "ATTEST_CODEC",
        }
    }
}
