//! Error types for the persistence substrate.

use std::path::PathBuf;
use thiserror::Error;
use vaultward_types::error::ErrorCode;

/// Errors raised by locks and document persistence.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The advisory lock could not be acquired before the deadline.
    #[error("Lock timeout after {waited_ms} ms on {path}")]
    LockTimeout {
        /// Lock file that stayed contended.
        path: PathBuf,
        /// How long acquisition was attempted.
        waited_ms: u64,
    },
    /// An underlying filesystem operation failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path the operation touched.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
    /// A document failed to serialize or parse.
    #[error("Document codec error on {path}: {reason}")]
    Document {
        /// Path of the document.
        path: PathBuf,
        /// Why the document was rejected.
        reason: String,
    },
}

impl StorageError {
    /// Wraps an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl ErrorCode for StorageError {
    fn code(&self) -> &'static str {
        match self {
            Self::LockTimeout { .. } => "STORAGE_LOCK_TIMEOUT",
            Self::Io { .. } => "STORAGE_IO",
            Self::Document { .. } => "STORAGE_DOCUMENT",
        }
    }
}
