//! Error types for the consent engine and ticket manager.

use thiserror::Error;
use vaultward_crypto::CryptoError;
use vaultward_storage::StorageError;
use vaultward_types::error::{CodecError, ErrorCode};

/// Errors raised by the consent engine.
#[derive(Debug, Error)]
pub enum ConsentError {
    /// The signer is not a configured key holder.
    #[error("Unknown key holder: {0}")]
    UnknownKeyHolder(String),
    /// No request with this id exists.
    #[error("Unknown request: {0}")]
    UnknownRequest(String),
    /// The signature does not verify; state was not mutated.
    #[error("Invalid signature from key holder {0}")]
    InvalidSignature(String),
    /// The request's deadline has passed.
    #[error("Request {0} has expired")]
    Expired(String),
    /// The request already left the pending state.
    #[error("Request {id} is terminal ({status})")]
    Terminal {
        /// The request.
        id: String,
        /// The status that forbids further transitions.
        status: String,
    },
    /// Malformed creation parameters.
    #[error("Invalid request input: {0}")]
    InvalidInput(String),
    /// Not enough shares have been contributed to reconstruct.
    #[error("Insufficient shares: have {have}, need {need}")]
    InsufficientShares {
        /// Shares contributed so far.
        have: usize,
        /// Threshold required.
        need: usize,
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

impl ErrorCode for ConsentError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownKeyHolder(_) => "CONSENT_UNKNOWN_KEY_HOLDER",
            Self::UnknownRequest(_) => "CONSENT_UNKNOWN_REQUEST",
            Self::InvalidSignature(_) => "CONSENT_INVALID_SIGNATURE",
            Self::Expired(_) => "CONSENT_EXPIRED",
            Self::Terminal { .. } => "CONSENT_TERMINAL",
            Self::InvalidInput(_) => "CONSENT_INVALID_INPUT",
            Self::InsufficientShares { .. } => "CONSENT_INSUFFICIENT_SHARES",
            Self::Storage(_) => "CONSENT_STORAGE",
            Self::Crypto(_) => "CONSENT_CRYPTO",
            Self::Codec(_) => "CONSENT_CODEC",
        }
    }
}

/// Errors raised by the ticket manager.
#[derive(Debug, Error)]
pub enum TicketError {
    /// The ticket's Owner signature does not verify.
    #[error("Invalid owner signature on ticket {0}")]
    InvalidSignature(String),
    /// The ticket's deadline has passed.
    #[error("Ticket {0} has expired")]
    Expired(String),
    /// A ticket with this id is already registered.
    #[error("Ticket {0} is already registered")]
    DuplicateRegistration(String),
    /// No ticket with this id is registered.
    #[error("Unknown ticket: {0}")]
    UnknownTicket(String),
    /// No registered, unexpired ticket authorizes the deletion.
    #[error("No authorizing ticket for path {path:?}, snapshot {snapshot_id:?}")]
    NoAuthorizingTicket {
        /// The path that was to be deleted.
        path: String,
        /// The snapshot that was to be deleted.
        snapshot_id: String,
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

impl ErrorCode for TicketError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidSignature(_) => "TICKET_INVALID_SIGNATURE",
            Self::Expired(_) => "TICKET_EXPIRED",
            Self::DuplicateRegistration(_) => "TICKET_DUPLICATE",
            Self::UnknownTicket(_) => "TICKET_UNKNOWN",
            Self::NoAuthorizingTicket { .. } => "TICKET_UNAUTHORIZED",
            Self::Storage(_) => "TICKET_STORAGE",
            Self::Crypto(_) => "TICKET_CRYPTO",
            Self::Codec(_) => "TICKET_CODEC",
        }
    }
}
