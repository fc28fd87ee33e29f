//! Error types for cryptographic operations.

use thiserror::Error;
use vaultward_types::error::ErrorCode;

/// Errors raised by the crypto primitives and the keystore.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A key had the wrong length for the operation.
    #[error("Invalid key size: expected {expected} bytes, got {got}")]
    InvalidKeySize {
        /// Required length in bytes.
        expected: usize,
        /// Length actually supplied.
        got: usize,
    },
    /// Hex input failed to decode or decoded to the wrong length.
    #[error("Invalid hex for {field}: {reason}")]
    InvalidHex {
        /// Name of the offending field.
        field: &'static str,
        /// Why decoding failed.
        reason: String,
    },
    /// The secret-sharing parameters or shares were malformed.
    #[error("Invalid share input: {0}")]
    InvalidShares(String),
    /// A keystore file was missing, unreadable, or malformed.
    #[error("Keystore error: {0}")]
    Keystore(String),
    /// An underlying operation failed.
    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl ErrorCode for CryptoError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidKeySize { .. } => "CRYPTO_INVALID_KEY_SIZE",
            Self::InvalidHex { .. } => "CRYPTO_INVALID_HEX",
            Self::InvalidShares(_) => "CRYPTO_INVALID_SHARES",
            Self::Keystore(_) => "CRYPTO_KEYSTORE",
            Self::OperationFailed(_) => "CRYPTO_OPERATION_FAILED",
        }
    }
}
