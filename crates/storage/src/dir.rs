//! The state-directory layout.
//!
//! These constants are the single source of truth for the documents a
//! principal persists. Using them prevents typos and keeps every manager
//! pointed at the same files.

use crate::error::StorageError;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// The Owner-signed snapshot manifest.
pub const MANIFEST_FILE: &str = "manifest.json";
/// The hash-chained audit entries.
pub const AUDIT_CHAIN_FILE: &str = "audit-chain.json";
/// The audit-chain head: `{sequence, last_hash, entry_count}`.
pub const AUDIT_STATE_FILE: &str = "audit-chain-state.json";
/// Registered deletion tickets.
pub const TICKETS_FILE: &str = "tickets.json";
/// Host-countersigned ticket usage records.
pub const TICKET_USAGE_FILE: &str = "ticket-usage.json";
/// Outstanding restore consent requests.
pub const RESTORE_REQUESTS_FILE: &str = "restore-requests.json";
/// Outstanding deletion consent requests.
pub const DELETION_REQUESTS_FILE: &str = "deletion-requests.json";
/// The jointly signed policy contract.
pub const POLICY_FILE: &str = "policy.json";
/// Issued per-file challenges.
pub const CHALLENGES_FILE: &str = "challenges.json";
/// Host responses to per-file challenges.
pub const CHALLENGE_RESPONSES_FILE: &str = "challenge-responses.json";
/// Issued block-level PoR challenges.
pub const POR_CHALLENGES_FILE: &str = "por-challenges.json";
/// Host responses to PoR challenges.
pub const POR_RESPONSES_FILE: &str = "por-responses.json";
/// The hash-chained heartbeat log.
pub const HEARTBEATS_FILE: &str = "heartbeats.json";
/// Dead-man switch state.
pub const DEADMAN_FILE: &str = "deadman-switch.json";

const DIR_MODE: u32 = 0o700;

/// A principal's state directory with typed paths to every document.
#[derive(Debug, Clone)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    /// Binds to `root` without touching the filesystem.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the directory with mode 0700 if it does not exist.
    pub fn ensure(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).map_err(|e| StorageError::io(&self.root, e))?;
        fs::set_permissions(&self.root, fs::Permissions::from_mode(DIR_MODE))
            .map_err(|e| StorageError::io(&self.root, e))
    }

    /// The directory root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a named document inside the directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}
