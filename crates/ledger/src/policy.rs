//! The jointly signed Owner/Host policy contract.
//!
//! Either party may sign first; a policy is active only once both
//! signatures verify over the same canonical hash. While the active policy
//! carries `append_only_locked`, any replacement that weakens retention,
//! deletion mode, or the lock itself is rejected outright.

use crate::error::LedgerError;
use parking_lot::RwLock;
use std::path::PathBuf;
use vaultward_crypto::key_store::LocalIdentity;
use vaultward_crypto::{nonce, sign};
use vaultward_storage::{atomic, dir, FileLock, StateDir};
use vaultward_types::identity::Role;
use vaultward_types::policy::{DeletionMode, Policy};
use vaultward_types::time::unix_now;

/// Parameters for drafting a new policy.
#[derive(Debug, Clone)]
pub struct PolicyDraft {
    /// Owner display name.
    pub owner_name: String,
    /// Owner public key, lowercase hex.
    pub owner_public_key: String,
    /// Host display name.
    pub host_name: String,
    /// Host public key, lowercase hex.
    pub host_public_key: String,
    /// Retention floor in days.
    pub retention_days: u32,
    /// Who must consent to deletions.
    pub deletion_mode: DeletionMode,
    /// Storage ceiling in bytes.
    pub max_storage_bytes: u64,
    /// Whether replacements may not weaken this contract.
    pub append_only_locked: bool,
    /// Unix seconds from which the contract applies.
    pub effective_at: i64,
    /// Unix seconds after which the contract lapses, zero for none.
    pub expires_at: i64,
}

/// Owns the persisted policy document.
pub struct PolicyManager {
    path: PathBuf,
    lock: FileLock,
    inner: RwLock<Option<Policy>>,
}

impl PolicyManager {
    /// Opens the policy store in `state`, loading any persisted contract.
    pub fn open(state: &StateDir) -> Result<Self, LedgerError> {
        let path = state.file(dir::POLICY_FILE);
        let current: Option<Policy> = if path.exists() {
            Some(atomic::read_json(&path)?)
        } else {
            None
        };
        Ok(Self {
            lock: FileLock::new(&path),
            path,
            inner: RwLock::new(current),
        })
    }

    /// Drafts an unsigned policy from `draft`, derived key ids included.
    pub fn draft(draft: PolicyDraft) -> Result<Policy, LedgerError> {
        let owner_pk = vaultward_crypto::codec::decode_public_key(&draft.owner_public_key)?;
        let host_pk = vaultward_crypto::codec::decode_public_key(&draft.host_public_key)?;
        let version = 1;
        Ok(Policy {
            id: nonce::random_id(),
            version,
            owner_name: draft.owner_name,
            owner_key_id: sign::key_id(&owner_pk),
            owner_public_key: draft.owner_public_key,
            host_name: draft.host_name,
            host_key_id: sign::key_id(&host_pk),
            host_public_key: draft.host_public_key,
            retention_days: draft.retention_days,
            deletion_mode: draft.deletion_mode,
            max_storage_bytes: draft.max_storage_bytes,
            append_only_locked: draft.append_only_locked,
            created_at: unix_now(),
            effective_at: draft.effective_at,
            expires_at: draft.expires_at,
            owner_signature: String::new(),
            host_signature: String::new(),
        })
    }

    /// Applies the local identity's signature to `policy`.
    ///
    /// The identity must be the party the policy names for its role; a
    /// stranger's key is rejected before any signature is computed.
    pub fn sign(&self, policy: &mut Policy, identity: &LocalIdentity) -> Result<(), LedgerError> {
        let hash = policy.signing_hash()?;
        match identity.role {
            Role::Owner if identity.key_id == policy.owner_key_id => {
                policy.owner_signature = identity.sign_hex(hash.as_bytes())?;
            }
            Role::Host if identity.key_id == policy.host_key_id => {
                policy.host_signature = identity.sign_hex(hash.as_bytes())?;
            }
            _ => {
                return Err(LedgerError::UnauthorizedSigner(format!(
                    "key {} is not a party to policy {}",
                    identity.key_id, policy.id
                )))
            }
        }
        Ok(())
    }

    /// Verifies both signatures over the canonical hash.
    pub fn verify(policy: &Policy) -> Result<(), LedgerError> {
        if !policy.is_fully_signed() {
            return Err(LedgerError::NotSigned(format!(
                "policy {} is missing a signature",
                policy.id
            )));
        }
        let hash = policy.signing_hash()?;
        if !sign::verify_hex(&policy.owner_public_key, hash.as_bytes(), &policy.owner_signature) {
            return Err(LedgerError::InvalidSignature(format!(
                "owner signature on policy {}",
                policy.id
            )));
        }
        if !sign::verify_hex(&policy.host_public_key, hash.as_bytes(), &policy.host_signature) {
            return Err(LedgerError::InvalidSignature(format!(
                "host signature on policy {}",
                policy.id
            )));
        }
        Ok(())
    }

    /// Whether `policy` is in force at `now`: both signatures verify and
    /// the effective window contains `now`.
    pub fn is_active_at(policy: &Policy, now: i64) -> bool {
        Self::verify(policy).is_ok()
            && policy.effective_at <= now
            && (policy.expires_at == 0 || now <= policy.expires_at)
    }

    /// Rejects a proposed replacement that weakens the active contract
    /// while `append_only_locked` is in force.
    pub fn validate_replacement(current: &Policy, proposed: &Policy) -> Result<(), LedgerError> {
        if !current.append_only_locked {
            return Ok(());
        }
        if proposed.retention_days < current.retention_days {
            return Err(LedgerError::PolicyWeakened(format!(
                "retention_days {} < {}",
                proposed.retention_days, current.retention_days
            )));
        }
        if proposed.deletion_mode.strictness() < current.deletion_mode.strictness() {
            return Err(LedgerError::PolicyWeakened(format!(
                "deletion_mode {:?} is weaker than {:?}",
                proposed.deletion_mode, current.deletion_mode
            )));
        }
        if !proposed.append_only_locked {
            return Err(LedgerError::PolicyWeakened(
                "append_only_locked may not be cleared".into(),
            ));
        }
        Ok(())
    }

    /// Activates `policy`, verifying signatures and, when a locked policy
    /// is already active, rejecting weakening replacements.
    pub fn activate(&self, policy: Policy) -> Result<(), LedgerError> {
        Self::verify(&policy)?;
        let mut inner = self.inner.write();
        if let Some(current) = inner.as_ref() {
            Self::validate_replacement(current, &policy)?;
        }
        self.lock
            .with_lock(|| atomic::write_json(&self.path, &policy))?;
        tracing::info!(target: "policy", id = %policy.id, version = policy.version, "policy activated");
        *inner = Some(policy);
        Ok(())
    }

    /// The active policy, verified on every load.
    pub fn current(&self) -> Result<Option<Policy>, LedgerError> {
        let inner = self.inner.read();
        match inner.as_ref() {
            Some(policy) => {
                Self::verify(policy)?;
                Ok(Some(policy.clone()))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn parties() -> (LocalIdentity, LocalIdentity) {
        (
            LocalIdentity::generate(Role::Owner).unwrap(),
            LocalIdentity::generate(Role::Host).unwrap(),
        )
    }

    fn draft_for(owner: &LocalIdentity, host: &LocalIdentity) -> PolicyDraft {
        PolicyDraft {
            owner_name: "owner".into(),
            owner_public_key: owner.public_key_hex(),
            host_name: "host".into(),
            host_public_key: host.public_key_hex(),
            retention_days: 90,
            deletion_mode: DeletionMode::BothRequired,
            max_storage_bytes: 1 << 40,
            append_only_locked: true,
            effective_at: 0,
            expires_at: 0,
        }
    }

    #[test]
    fn both_signatures_activate() {
        let dir = tempdir().unwrap();
        let state = StateDir::new(dir.path());
        state.ensure().unwrap();
        let (owner, host) = parties();
        let manager = PolicyManager::open(&state).unwrap();

        let mut policy = PolicyManager::draft(draft_for(&owner, &host)).unwrap();
        assert!(PolicyManager::verify(&policy).is_err());

        manager.sign(&mut policy, &owner).unwrap();
        manager.sign(&mut policy, &host).unwrap();
        PolicyManager::verify(&policy).unwrap();
        assert!(PolicyManager::is_active_at(&policy, unix_now()));

        manager.activate(policy.clone()).unwrap();
        let reopened = PolicyManager::open(&state).unwrap();
        assert_eq!(reopened.current().unwrap().unwrap().id, policy.id);
    }

    #[test]
    fn stranger_cannot_sign() {
        let (owner, host) = parties();
        let stranger = LocalIdentity::generate(Role::Host).unwrap();
        let dir = tempdir().unwrap();
        let state = StateDir::new(dir.path());
        state.ensure().unwrap();
        let manager = PolicyManager::open(&state).unwrap();
        let mut policy = PolicyManager::draft(draft_for(&owner, &host)).unwrap();
        assert!(manager.sign(&mut policy, &stranger).is_err());
    }

    #[test]
    fn locked_policy_rejects_weakening() {
        let (owner, host) = parties();
        let current = PolicyManager::draft(draft_for(&owner, &host)).unwrap();

        let mut weaker_retention = current.clone();
        weaker_retention.retention_days = 30;
        assert!(PolicyManager::validate_replacement(&current, &weaker_retention).is_err());

        let mut weaker_mode = current.clone();
        weaker_mode.deletion_mode = DeletionMode::OwnerOnly;
        assert!(PolicyManager::validate_replacement(&current, &weaker_mode).is_err());

        let mut unlocked = current.clone();
        unlocked.append_only_locked = false;
        assert!(PolicyManager::validate_replacement(&current, &unlocked).is_err());

        let mut stricter = current.clone();
        stricter.retention_days = 180;
        stricter.deletion_mode = DeletionMode::Never;
        PolicyManager::validate_replacement(&current, &stricter).unwrap();
    }

    #[test]
    fn tampered_field_breaks_verification() {
        let (owner, host) = parties();
        let dir = tempdir().unwrap();
        let state = StateDir::new(dir.path());
        state.ensure().unwrap();
        let manager = PolicyManager::open(&state).unwrap();
        let mut policy = PolicyManager::draft(draft_for(&owner, &host)).unwrap();
        manager.sign(&mut policy, &owner).unwrap();
        manager.sign(&mut policy, &host).unwrap();

        policy.retention_days = 1;
        assert!(PolicyManager::verify(&policy).is_err());
    }
}
