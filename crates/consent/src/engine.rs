//! The restore/deletion consent state machines.
//!
//! Both request kinds move `pending → approved | denied | expired`. An
//! approval is appended only after its signature verifies against the
//! canonical request hash bound to the signing holder's id; reaching the
//! threshold flips the request to approved in the same transition. Expiry
//! is observed lazily: reads report it, and the first mutating operation
//! that encounters it makes it durable.

use crate::error::ConsentError;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use vaultward_crypto::shamir::{self, Share};
use vaultward_crypto::{nonce, sign};
use vaultward_storage::{atomic, dir, FileLock, StateDir};
use vaultward_types::consent::{
    Approval, ApprovalProgress, DeletionRequest, DeletionType, RequestStatus, RestoreRequest,
    StoredShare,
};
use vaultward_types::error::CodecError;
use vaultward_types::identity::KeyHolderDirectory;
use vaultward_types::time::unix_now;

trait ConsentRecord: Clone {
    fn id(&self) -> &str;
    fn status(&self) -> RequestStatus;
    fn set_status(&mut self, status: RequestStatus);
    fn set_approved_at(&mut self, at: i64);
    fn approvals(&self) -> &[Approval];
    fn approvals_mut(&mut self) -> &mut Vec<Approval>;
    fn shares(&self) -> &[StoredShare];
    fn shares_mut(&mut self) -> &mut Vec<StoredShare>;
    fn required_approvals(&self) -> u32;
    fn is_expired_at(&self, now: i64) -> bool;
    fn signing_hash(&self, key_holder_id: &str) -> Result<String, CodecError>;
    fn progress(&self) -> ApprovalProgress;
}

macro_rules! impl_consent_record {
    ($ty:ty) => {
        impl ConsentRecord for $ty {
            fn id(&self) -> &str {
                &self.id
            }
            fn status(&self) -> RequestStatus {
                self.status
            }
            fn set_status(&mut self, status: RequestStatus) {
                self.status = status;
            }
            fn set_approved_at(&mut self, at: i64) {
                self.approved_at = at;
            }
            fn approvals(&self) -> &[Approval] {
                &self.approvals
            }
            fn approvals_mut(&mut self) -> &mut Vec<Approval> {
                &mut self.approvals
            }
            fn shares(&self) -> &[StoredShare] {
                &self.shares
            }
            fn shares_mut(&mut self) -> &mut Vec<StoredShare> {
                &mut self.shares
            }
            fn required_approvals(&self) -> u32 {
                self.required_approvals
            }
            fn is_expired_at(&self, now: i64) -> bool {
                <$ty>::is_expired_at(self, now)
            }
            fn signing_hash(&self, key_holder_id: &str) -> Result<String, CodecError> {
                <$ty>::signing_hash(self, key_holder_id)
            }
            fn progress(&self) -> ApprovalProgress {
                <$ty>::progress(self)
            }
        }
    };
}

impl_consent_record!(RestoreRequest);
impl_consent_record!(DeletionRequest);

#[derive(Default)]
struct ConsentState {
    restores: Vec<RestoreRequest>,
    deletions: Vec<DeletionRequest>,
}

/// Owns both consent request collections.
pub struct ConsentManager {
    restore_path: PathBuf,
    deletion_path: PathBuf,
    restore_lock: FileLock,
    deletion_lock: FileLock,
    directory: Arc<dyn KeyHolderDirectory>,
    inner: RwLock<ConsentState>,
}

impl ConsentManager {
    /// Opens the consent store in `state` with an injected key-holder
    /// lookup.
    pub fn open(
        state: &StateDir,
        directory: Arc<dyn KeyHolderDirectory>,
    ) -> Result<Self, ConsentError> {
        let restore_path = state.file(dir::RESTORE_REQUESTS_FILE);
        let deletion_path = state.file(dir::DELETION_REQUESTS_FILE);
        let restores: Vec<RestoreRequest> = atomic::read_json_or_default(&restore_path)?;
        let deletions: Vec<DeletionRequest> = atomic::read_json_or_default(&deletion_path)?;
        Ok(Self {
            restore_lock: FileLock::new(&restore_path),
            deletion_lock: FileLock::new(&deletion_path),
            restore_path,
            deletion_path,
            directory,
            inner: RwLock::new(ConsentState { restores, deletions }),
        })
    }

    fn persist_restores(&self, restores: &[RestoreRequest]) -> Result<(), ConsentError> {
        self.restore_lock
            .with_lock(|| atomic::write_json(&self.restore_path, &restores))?;
        Ok(())
    }

    fn persist_deletions(&self, deletions: &[DeletionRequest]) -> Result<(), ConsentError> {
        self.deletion_lock
            .with_lock(|| atomic::write_json(&self.deletion_path, &deletions))?;
        Ok(())
    }

    /// Creates a pending restore request. Paths are stored sorted, the
    /// order they are signed in.
    pub fn create_restore_request(
        &self,
        requester: &str,
        snapshot_id: &str,
        paths: Vec<String>,
        reason: &str,
        required_approvals: u32,
        ttl_secs: i64,
    ) -> Result<RestoreRequest, ConsentError> {
        if required_approvals == 0 {
            return Err(ConsentError::InvalidInput(
                "required_approvals must be >= 1".into(),
            ));
        }
        let now = unix_now();
        let mut sorted_paths = paths;
        sorted_paths.sort();
        let request = RestoreRequest {
            id: nonce::random_id(),
            requester: requester.to_string(),
            snapshot_id: snapshot_id.to_string(),
            paths: sorted_paths,
            reason: reason.to_string(),
            status: RequestStatus::Pending,
            created_at: now,
            expires_at: now + ttl_secs,
            required_approvals,
            approvals: Vec::new(),
            shares: Vec::new(),
            approved_at: 0,
        };
        let mut inner = self.inner.write();
        let mut restores = inner.restores.clone();
        restores.push(request.clone());
        self.persist_restores(&restores)?;
        inner.restores = restores;
        tracing::info!(target: "consent", id = %request.id, "restore request created");
        Ok(request)
    }

    /// Creates a pending deletion request.
    pub fn create_deletion_request(
        &self,
        requester: &str,
        deletion_type: DeletionType,
        snapshot_ids: Vec<String>,
        paths: Vec<String>,
        reason: &str,
        required_approvals: u32,
        ttl_secs: i64,
    ) -> Result<DeletionRequest, ConsentError> {
        if required_approvals == 0 {
            return Err(ConsentError::InvalidInput(
                "required_approvals must be >= 1".into(),
            ));
        }
        let now = unix_now();
        let mut sorted_ids = snapshot_ids;
        sorted_ids.sort();
        let mut sorted_paths = paths;
        sorted_paths.sort();
        let request = DeletionRequest {
            id: nonce::random_id(),
            requester: requester.to_string(),
            deletion_type,
            snapshot_ids: sorted_ids,
            paths: sorted_paths,
            reason: reason.to_string(),
            status: RequestStatus::Pending,
            created_at: now,
            expires_at: now + ttl_secs,
            required_approvals,
            approvals: Vec::new(),
            shares: Vec::new(),
            approved_at: 0,
            executed_at: 0,
        };
        let mut inner = self.inner.write();
        let mut deletions = inner.deletions.clone();
        deletions.push(request.clone());
        self.persist_deletions(&deletions)?;
        inner.deletions = deletions;
        tracing::info!(target: "consent", id = %request.id, ?deletion_type, "deletion request created");
        Ok(request)
    }

    fn apply_signature<R: ConsentRecord>(
        &self,
        request: &mut R,
        key_holder_id: &str,
        signature_hex: &str,
        now: i64,
    ) -> Result<ApprovalProgress, ConsentError> {
        match request.status() {
            RequestStatus::Pending => {}
            // Signing an already-approved request is a no-op.
            RequestStatus::Approved => return Ok(request.progress()),
            RequestStatus::Denied => {
                return Err(ConsentError::Terminal {
                    id: request.id().to_string(),
                    status: "denied".into(),
                })
            }
            RequestStatus::Expired => return Err(ConsentError::Expired(request.id().to_string())),
        }
        if request.is_expired_at(now) {
            request.set_status(RequestStatus::Expired);
            return Err(ConsentError::Expired(request.id().to_string()));
        }

        let holder = self
            .directory
            .key_holder(key_holder_id)
            .ok_or_else(|| ConsentError::UnknownKeyHolder(key_holder_id.to_string()))?;

        if request.approvals().iter().any(|a| a.key_holder_id == holder.id) {
            return Ok(request.progress());
        }

        let hash = request.signing_hash(&holder.id)?;
        if !sign::verify_hex(&holder.public_key, hash.as_bytes(), signature_hex) {
            return Err(ConsentError::InvalidSignature(holder.id));
        }

        request.approvals_mut().push(Approval {
            key_holder_id: holder.id.clone(),
            key_holder_name: holder.name.clone(),
            signature: signature_hex.to_string(),
            approved_at: now,
        });
        if request.approvals().len() as u32 >= request.required_approvals() {
            request.set_status(RequestStatus::Approved);
            request.set_approved_at(now);
            tracing::info!(target: "consent", id = %request.id(), "request approved");
        }
        Ok(request.progress())
    }

    /// Records one holder's signature over the request.
    ///
    /// Approval and progress are persisted together or not at all: the
    /// document is written before the in-memory state is committed.
    pub fn sign_request(
        &self,
        request_id: &str,
        key_holder_id: &str,
        signature_hex: &str,
    ) -> Result<ApprovalProgress, ConsentError> {
        let now = unix_now();
        let mut inner = self.inner.write();

        if let Some(pos) = inner.restores.iter().position(|r| r.id == request_id) {
            let mut updated = inner.restores[pos].clone();
            let result = self.apply_signature(&mut updated, key_holder_id, signature_hex, now);
            if updated != inner.restores[pos] {
                let mut restores = inner.restores.clone();
                restores[pos] = updated;
                self.persist_restores(&restores)?;
                inner.restores = restores;
            }
            return result;
        }
        if let Some(pos) = inner.deletions.iter().position(|r| r.id == request_id) {
            let mut updated = inner.deletions[pos].clone();
            let result = self.apply_signature(&mut updated, key_holder_id, signature_hex, now);
            if updated != inner.deletions[pos] {
                let mut deletions = inner.deletions.clone();
                deletions[pos] = updated;
                self.persist_deletions(&deletions)?;
                inner.deletions = deletions;
            }
            return result;
        }
        Err(ConsentError::UnknownRequest(request_id.to_string()))
    }

    fn apply_denial<R: ConsentRecord>(
        &self,
        request: &mut R,
        key_holder_id: &str,
        now: i64,
    ) -> Result<(), ConsentError> {
        // Any configured key holder may deny; consent is unanimous trust.
        self.directory
            .key_holder(key_holder_id)
            .ok_or_else(|| ConsentError::UnknownKeyHolder(key_holder_id.to_string()))?;
        match request.status() {
            RequestStatus::Pending => {}
            status => {
                return Err(ConsentError::Terminal {
                    id: request.id().to_string(),
                    status: format!("{:?}", status).to_lowercase(),
                })
            }
        }
        if request.is_expired_at(now) {
            request.set_status(RequestStatus::Expired);
            return Err(ConsentError::Expired(request.id().to_string()));
        }
        request.set_status(RequestStatus::Denied);
        tracing::info!(target: "consent", id = %request.id(), denier = key_holder_id, "request denied");
        Ok(())
    }

    /// Denies a pending request.
    pub fn deny_request(&self, request_id: &str, key_holder_id: &str) -> Result<(), ConsentError> {
        let now = unix_now();
        let mut inner = self.inner.write();

        if let Some(pos) = inner.restores.iter().position(|r| r.id == request_id) {
            let mut updated = inner.restores[pos].clone();
            let result = self.apply_denial(&mut updated, key_holder_id, now);
            if updated != inner.restores[pos] {
                let mut restores = inner.restores.clone();
                restores[pos] = updated;
                self.persist_restores(&restores)?;
                inner.restores = restores;
            }
            return result;
        }
        if let Some(pos) = inner.deletions.iter().position(|r| r.id == request_id) {
            let mut updated = inner.deletions[pos].clone();
            let result = self.apply_denial(&mut updated, key_holder_id, now);
            if updated != inner.deletions[pos] {
                let mut deletions = inner.deletions.clone();
                deletions[pos] = updated;
                self.persist_deletions(&deletions)?;
                inner.deletions = deletions;
            }
            return result;
        }
        Err(ConsentError::UnknownRequest(request_id.to_string()))
    }

    fn apply_share<R: ConsentRecord>(
        &self,
        request: &mut R,
        key_holder_id: &str,
        share: &Share,
        now: i64,
    ) -> Result<usize, ConsentError> {
        self.directory
            .key_holder(key_holder_id)
            .ok_or_else(|| ConsentError::UnknownKeyHolder(key_holder_id.to_string()))?;
        if request.status() == RequestStatus::Expired || request.is_expired_at(now) {
            request.set_status(RequestStatus::Expired);
            return Err(ConsentError::Expired(request.id().to_string()));
        }
        if request.shares().iter().any(|s| s.key_holder_id == key_holder_id) {
            return Ok(request.shares().len());
        }
        request.shares_mut().push(StoredShare {
            key_holder_id: key_holder_id.to_string(),
            index: share.index,
            data: hex::encode(&share.data),
            added_at: now,
        });
        Ok(request.shares().len())
    }

    /// Legacy secret-share mode: records a holder's share against the
    /// request, returning the number of shares collected.
    pub fn add_share(
        &self,
        request_id: &str,
        key_holder_id: &str,
        share: &Share,
    ) -> Result<usize, ConsentError> {
        let now = unix_now();
        let mut inner = self.inner.write();

        if let Some(pos) = inner.restores.iter().position(|r| r.id == request_id) {
            let mut updated = inner.restores[pos].clone();
            let result = self.apply_share(&mut updated, key_holder_id, share, now);
            if updated != inner.restores[pos] {
                let mut restores = inner.restores.clone();
                restores[pos] = updated;
                self.persist_restores(&restores)?;
                inner.restores = restores;
            }
            return result;
        }
        if let Some(pos) = inner.deletions.iter().position(|r| r.id == request_id) {
            let mut updated = inner.deletions[pos].clone();
            let result = self.apply_share(&mut updated, key_holder_id, share, now);
            if updated != inner.deletions[pos] {
                let mut deletions = inner.deletions.clone();
                deletions[pos] = updated;
                self.persist_deletions(&deletions)?;
                inner.deletions = deletions;
            }
            return result;
        }
        Err(ConsentError::UnknownRequest(request_id.to_string()))
    }

    /// Reconstructs the shared secret from at least `threshold` collected
    /// shares. Runs locally inside the Owner process; nothing is persisted.
    pub fn reconstruct_secret(
        &self,
        request_id: &str,
        threshold: u8,
    ) -> Result<Vec<u8>, ConsentError> {
        let inner = self.inner.read();
        let stored: Vec<StoredShare> = inner
            .restores
            .iter()
            .find(|r| r.id == request_id)
            .map(|r| r.shares.clone())
            .or_else(|| {
                inner
                    .deletions
                    .iter()
                    .find(|r| r.id == request_id)
                    .map(|r| r.shares.clone())
            })
            .ok_or_else(|| ConsentError::UnknownRequest(request_id.to_string()))?;

        if stored.len() < threshold as usize {
            return Err(ConsentError::InsufficientShares {
                have: stored.len(),
                need: threshold as usize,
            });
        }
        let shares: Vec<Share> = stored
            .iter()
            .map(|s| {
                hex::decode(&s.data)
                    .map(|data| Share {
                        index: s.index,
                        data,
                    })
                    .map_err(|e| {
                        ConsentError::InvalidInput(format!("share from {}: {}", s.key_holder_id, e))
                    })
            })
            .collect::<Result<_, _>>()?;
        Ok(shamir::combine(&shares)?)
    }

    /// Marks a deletion request as executed.
    pub fn mark_deletion_executed(&self, request_id: &str) -> Result<(), ConsentError> {
        let mut inner = self.inner.write();
        let pos = inner
            .deletions
            .iter()
            .position(|r| r.id == request_id)
            .ok_or_else(|| ConsentError::UnknownRequest(request_id.to_string()))?;
        let mut deletions = inner.deletions.clone();
        deletions[pos].executed_at = unix_now();
        self.persist_deletions(&deletions)?;
        inner.deletions = deletions;
        Ok(())
    }

    fn effective_restore(request: &RestoreRequest, now: i64) -> RestoreRequest {
        let mut copy = request.clone();
        if copy.status == RequestStatus::Pending && copy.is_expired_at(now) {
            copy.status = RequestStatus::Expired;
        }
        copy
    }

    fn effective_deletion(request: &DeletionRequest, now: i64) -> DeletionRequest {
        let mut copy = request.clone();
        if copy.status == RequestStatus::Pending && copy.is_expired_at(now) {
            copy.status = RequestStatus::Expired;
        }
        copy
    }

    /// A restore request by id, expiry observed.
    pub fn get_restore(&self, request_id: &str) -> Option<RestoreRequest> {
        let now = unix_now();
        self.inner
            .read()
            .restores
            .iter()
            .find(|r| r.id == request_id)
            .map(|r| Self::effective_restore(r, now))
    }

    /// A deletion request by id, expiry observed.
    pub fn get_deletion(&self, request_id: &str) -> Option<DeletionRequest> {
        let now = unix_now();
        self.inner
            .read()
            .deletions
            .iter()
            .find(|r| r.id == request_id)
            .map(|r| Self::effective_deletion(r, now))
    }

    /// All restore requests, expiry observed.
    pub fn list_restores(&self) -> Vec<RestoreRequest> {
        let now = unix_now();
        self.inner
            .read()
            .restores
            .iter()
            .map(|r| Self::effective_restore(r, now))
            .collect()
    }

    /// All deletion requests, expiry observed.
    pub fn list_deletions(&self) -> Vec<DeletionRequest> {
        let now = unix_now();
        self.inner
            .read()
            .deletions
            .iter()
            .map(|r| Self::effective_deletion(r, now))
            .collect()
    }
}
