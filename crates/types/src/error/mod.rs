//! Shared error machinery for the Vaultward control plane.
//!
//! Domain crates define their own `thiserror` enums close to the managers
//! that raise them; this module only carries what every crate needs: the
//! [`ErrorCode`] trait for stable machine-readable codes, and the small
//! [`CodecError`] raised by the canonical-hash contract itself.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors raised while producing canonical bytes for signing or hashing.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Serialization of a signing view failed.
    #[error("Canonical serialization failed: {0}")]
    Serialize(String),
    /// A field violated the canonical-encoding contract.
    #[error("Invalid canonical field {field}: {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// Why the field was rejected.
        reason: String,
    },
}

impl ErrorCode for CodecError {
    fn code(&self) -> &'static str {
        match self {
            Self::Serialize(_) => "CODEC_SERIALIZE_FAILED",
            Self::InvalidField { .. } => "CODEC_INVALID_FIELD",
        }
    }
}
