//! The Owner-signed snapshot manifest.

use crate::error::LedgerError;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::path::PathBuf;
use vaultward_crypto::key_store::LocalIdentity;
use vaultward_crypto::sign;
use vaultward_storage::{atomic, dir, FileLock, StateDir};
use vaultward_types::manifest::{IntegrityReport, Manifest, SnapshotEntry};
use vaultward_types::time::unix_now;

const MANIFEST_VERSION: u32 = 1;

/// Owns the persisted manifest document; every mutation recomputes the
/// Merkle root and re-signs before persisting under the advisory lock.
pub struct ManifestManager {
    path: PathBuf,
    lock: FileLock,
    owner: LocalIdentity,
    inner: RwLock<Manifest>,
}

impl ManifestManager {
    /// Opens the manifest in `state`, creating an empty signed one when
    /// absent.
    pub fn open(state: &StateDir, owner: LocalIdentity) -> Result<Self, LedgerError> {
        let path = state.file(dir::MANIFEST_FILE);
        let lock = FileLock::new(&path);
        let manifest = if path.exists() {
            atomic::read_json(&path)?
        } else {
            let now = unix_now();
            let mut fresh = Manifest {
                version: MANIFEST_VERSION,
                policy_id: String::new(),
                owner_id: owner.key_id.clone(),
                created_at: now,
                updated_at: now,
                snapshots: Vec::new(),
                merkle_root: String::new(),
                owner_signature: String::new(),
            };
            Self::seal(&mut fresh, &owner)?;
            lock.with_lock(|| atomic::write_json(&path, &fresh))?;
            fresh
        };
        Ok(Self {
            path,
            lock,
            owner,
            inner: RwLock::new(manifest),
        })
    }

    fn seal(manifest: &mut Manifest, owner: &LocalIdentity) -> Result<(), LedgerError> {
        manifest.merkle_root = manifest.computed_merkle_root();
        let hash = manifest.signing_hash()?;
        manifest.owner_signature = owner.sign_hex(hash.as_bytes())?;
        Ok(())
    }

    fn persist(&self, manifest: &Manifest) -> Result<(), LedgerError> {
        self.lock
            .with_lock(|| atomic::write_json(&self.path, manifest))?;
        Ok(())
    }

    /// Resets to an empty manifest bound to `policy_id` and re-signs.
    pub fn initialize(&self, policy_id: &str) -> Result<(), LedgerError> {
        let mut inner = self.inner.write();
        let now = unix_now();
        let mut fresh = Manifest {
            version: MANIFEST_VERSION,
            policy_id: policy_id.to_string(),
            owner_id: self.owner.key_id.clone(),
            created_at: now,
            updated_at: now,
            snapshots: Vec::new(),
            merkle_root: String::new(),
            owner_signature: String::new(),
        };
        Self::seal(&mut fresh, &self.owner)?;
        self.persist(&fresh)?;
        *inner = fresh;
        Ok(())
    }

    /// Appends a snapshot, rejecting duplicate ids.
    pub fn add_snapshot(&self, entry: SnapshotEntry) -> Result<(), LedgerError> {
        let mut inner = self.inner.write();
        if inner.snapshots.iter().any(|s| s.id == entry.id) {
            return Err(LedgerError::DuplicateSnapshot(entry.id));
        }
        let mut next = inner.clone();
        next.snapshots.push(entry);
        next.updated_at = unix_now();
        Self::seal(&mut next, &self.owner)?;
        self.persist(&next)?;
        tracing::debug!(target: "manifest", count = next.snapshots.len(), "snapshot added");
        *inner = next;
        Ok(())
    }

    /// Removes a snapshot by id.
    ///
    /// Consent gating happens upstream: callers invoke this only after an
    /// approved deletion path surfaced the id.
    pub fn remove_snapshot(&self, id: &str) -> Result<(), LedgerError> {
        let mut inner = self.inner.write();
        if !inner.snapshots.iter().any(|s| s.id == id) {
            return Err(LedgerError::UnknownSnapshot(id.to_string()));
        }
        let mut next = inner.clone();
        next.snapshots.retain(|s| s.id != id);
        next.updated_at = unix_now();
        Self::seal(&mut next, &self.owner)?;
        self.persist(&next)?;
        tracing::debug!(target: "manifest", id, "snapshot removed");
        *inner = next;
        Ok(())
    }

    /// Verifies the stored Merkle root and the Owner signature.
    pub fn verify(&self) -> Result<(), LedgerError> {
        let inner = self.inner.read();
        verify_manifest(&inner, &self.owner.public_key_hex())
    }

    /// Compares the manifest's snapshot set against what the storage
    /// collaborator reports.
    pub fn check_integrity<E: std::fmt::Display>(
        &self,
        list_storage: impl FnOnce() -> Result<Vec<String>, E>,
    ) -> Result<IntegrityReport, LedgerError> {
        let stored: BTreeSet<String> = list_storage()
            .map_err(|e| LedgerError::Internal(format!("storage listing failed: {}", e)))?
            .into_iter()
            .collect();
        let inner = self.inner.read();
        let known: BTreeSet<String> = inner.snapshots.iter().map(|s| s.id.clone()).collect();
        let missing: Vec<String> = known.difference(&stored).cloned().collect();
        let unexpected: Vec<String> = stored.difference(&known).cloned().collect();
        let verified = missing.is_empty() && unexpected.is_empty();
        Ok(IntegrityReport {
            missing,
            unexpected,
            verified,
        })
    }

    /// The current Merkle root.
    pub fn merkle_root(&self) -> String {
        self.inner.read().merkle_root.clone()
    }

    /// A copy of the current manifest.
    pub fn manifest(&self) -> Manifest {
        self.inner.read().clone()
    }

    /// Number of registered snapshots.
    pub fn snapshot_count(&self) -> u64 {
        self.inner.read().snapshots.len() as u64
    }

    /// Sum of registered snapshot sizes in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.inner.read().snapshots.iter().map(|s| s.size).sum()
    }
}

/// Verifies a manifest against an Owner public key: the Merkle root must
/// recompute to the stored value and the signature must verify over the
/// canonical hash.
pub fn verify_manifest(manifest: &Manifest, owner_public_key_hex: &str) -> Result<(), LedgerError> {
    let computed = manifest.computed_merkle_root();
    if computed != manifest.merkle_root {
        return Err(LedgerError::MerkleMismatch {
            stored: manifest.merkle_root.clone(),
            computed,
        });
    }
    if manifest.owner_signature.is_empty() {
        return Err(LedgerError::NotSigned("manifest is not signed".into()));
    }
    let hash = manifest.signing_hash()?;
    if !sign::verify_hex(owner_public_key_hex, hash.as_bytes(), &manifest.owner_signature) {
        return Err(LedgerError::InvalidSignature(
            "manifest owner signature".into(),
        ));
    }
    Ok(())
}
