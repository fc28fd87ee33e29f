//! On-disk storage for the local identity and the key-holder roster.
//!
//! `identity.json` holds the principal's role and Ed25519 keypair and is
//! written with mode 0600 inside a 0700 directory; the private half lives
//! in a zeroizing buffer while in memory. `key-holders.json` holds the
//! configured roster and backs the injected lookup capability. No key
//! rotation is in scope.

use crate::codec::{decode_private_key, decode_public_key};
use crate::error::CryptoError;
use crate::sign;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use vaultward_types::identity::{KeyHolder, KeyHolderDirectory, Role};
use vaultward_types::time::unix_now;
use zeroize::Zeroizing;

/// File name of the persisted identity.
pub const IDENTITY_FILE: &str = "identity.json";
/// File name of the persisted key-holder roster.
pub const KEY_HOLDERS_FILE: &str = "key-holders.json";

const FILE_MODE: u32 = 0o600;
const DIR_MODE: u32 = 0o700;

/// The local principal's identity, private key held in zeroizing memory.
#[derive(Clone)]
pub struct LocalIdentity {
    /// Role this identity plays.
    pub role: Role,
    /// Stable key id derived from the public key.
    pub key_id: String,
    /// Raw 32-byte public key.
    pub public_key: Vec<u8>,
    private_key: Zeroizing<Vec<u8>>,
}

#[derive(Serialize, Deserialize)]
struct IdentityFile {
    role: Role,
    key_id: String,
    public_key: String,
    private_key: String,
    created_at: i64,
}

impl LocalIdentity {
    /// Generates a fresh identity for the given role.
    pub fn generate(role: Role) -> Result<Self, CryptoError> {
        let (public_key, private_key) = sign::generate_identity()?;
        Ok(Self {
            role,
            key_id: sign::key_id(&public_key),
            public_key,
            private_key,
        })
    }

    /// Wraps an existing keypair, deriving the key id from the public half.
    pub fn from_keypair(
        role: Role,
        public_key: Vec<u8>,
        private_key: Zeroizing<Vec<u8>>,
    ) -> Self {
        Self {
            role,
            key_id: sign::key_id(&public_key),
            public_key,
            private_key,
        }
    }

    /// Signs `message`, returning the hex-encoded signature.
    pub fn sign_hex(&self, message: &[u8]) -> Result<String, CryptoError> {
        sign::sign_to_hex(&self.private_key, message)
    }

    /// The public key as lowercase hex.
    pub fn public_key_hex(&self) -> String {
        hex::encode(&self.public_key)
    }
}

fn write_private(path: &Path, bytes: &[u8]) -> Result<(), CryptoError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| CryptoError::Keystore(format!("create {}: {}", parent.display(), e)))?;
        fs::set_permissions(parent, fs::Permissions::from_mode(DIR_MODE))
            .map_err(|e| CryptoError::Keystore(format!("chmod {}: {}", parent.display(), e)))?;
    }
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(FILE_MODE)
            .open(&tmp)
            .map_err(|e| CryptoError::Keystore(format!("open {}: {}", tmp.display(), e)))?;
        file.write_all(bytes)
            .map_err(|e| CryptoError::Keystore(format!("write {}: {}", tmp.display(), e)))?;
        file.sync_all()
            .map_err(|e| CryptoError::Keystore(format!("sync {}: {}", tmp.display(), e)))?;
    }
    fs::rename(&tmp, path)
        .map_err(|e| CryptoError::Keystore(format!("rename to {}: {}", path.display(), e)))
}

/// Persists an identity to `dir/identity.json` with mode 0600.
pub fn save_identity(dir: &Path, identity: &LocalIdentity) -> Result<(), CryptoError> {
    let record = IdentityFile {
        role: identity.role,
        key_id: identity.key_id.clone(),
        public_key: identity.public_key_hex(),
        private_key: hex::encode(identity.private_key.as_slice()),
        created_at: unix_now(),
    };
    let bytes = serde_json::to_vec_pretty(&record)
        .map_err(|e| CryptoError::Keystore(format!("serialize identity: {}", e)))?;
    write_private(&dir.join(IDENTITY_FILE), &bytes)
}

/// Loads the identity from `dir/identity.json`.
pub fn load_identity(dir: &Path) -> Result<LocalIdentity, CryptoError> {
    let path = dir.join(IDENTITY_FILE);
    let bytes = fs::read(&path)
        .map_err(|e| CryptoError::Keystore(format!("read {}: {}", path.display(), e)))?;
    let record: IdentityFile = serde_json::from_slice(&bytes)
        .map_err(|e| CryptoError::Keystore(format!("parse {}: {}", path.display(), e)))?;
    let public_key = decode_public_key(&record.public_key)?;
    let private_key = decode_private_key(&record.private_key)?;
    let derived = sign::key_id(&public_key);
    if derived != record.key_id {
        return Err(CryptoError::Keystore(format!(
            "key id mismatch: file says {}, key derives {}",
            record.key_id, derived
        )));
    }
    Ok(LocalIdentity {
        role: record.role,
        key_id: record.key_id,
        public_key,
        private_key,
    })
}

/// The configured key-holder roster, persisted beside the identity.
pub struct KeyHolderRoster {
    path: PathBuf,
    holders: Vec<KeyHolder>,
}

impl KeyHolderRoster {
    /// Opens the roster in `dir`, creating an empty one if absent.
    pub fn open(dir: &Path) -> Result<Self, CryptoError> {
        let path = dir.join(KEY_HOLDERS_FILE);
        let holders = if path.exists() {
            let bytes = fs::read(&path)
                .map_err(|e| CryptoError::Keystore(format!("read {}: {}", path.display(), e)))?;
            serde_json::from_slice(&bytes)
                .map_err(|e| CryptoError::Keystore(format!("parse {}: {}", path.display(), e)))?
        } else {
            Vec::new()
        };
        Ok(Self { path, holders })
    }

    /// Adds a holder and persists the roster. Duplicate ids are rejected.
    pub fn add(&mut self, holder: KeyHolder) -> Result<(), CryptoError> {
        if self.holders.iter().any(|h| h.id == holder.id) {
            return Err(CryptoError::Keystore(format!(
                "key holder {} already registered",
                holder.id
            )));
        }
        self.holders.push(holder);
        self.persist()
    }

    fn persist(&self) -> Result<(), CryptoError> {
        let bytes = serde_json::to_vec_pretty(&self.holders)
            .map_err(|e| CryptoError::Keystore(format!("serialize roster: {}", e)))?;
        write_private(&self.path, &bytes)
    }
}

impl KeyHolderDirectory for KeyHolderRoster {
    fn key_holder(&self, key_id: &str) -> Option<KeyHolder> {
        self.holders.iter().find(|h| h.id == key_id).cloned()
    }

    fn key_holders(&self) -> Vec<KeyHolder> {
        self.holders.clone()
    }
}
