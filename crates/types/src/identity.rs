//! Key-holder identities.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The role a local identity plays in the two-party protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The principal producing backups; signs policy, manifest, requests,
    /// and tickets.
    Owner,
    /// The principal storing backups; signs audit entries, heartbeats, and
    /// usage receipts.
    Host,
}

/// A named participant in consent decisions.
///
/// The `id` is derived from the public key and is stable for the life of the
/// key; private keys never leave their holder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyHolder {
    /// First 16 hex chars of SHA-256 over the public key bytes.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Ed25519 public key, lowercase hex.
    pub public_key: String,
    /// Whether this holder is the Owner principal.
    pub is_owner: bool,
    /// Unix seconds at which the holder joined the roster.
    pub joined_at: i64,
}

impl KeyHolder {
    /// Builds a holder from raw public key bytes, deriving its stable id.
    pub fn from_public_key(name: &str, public_key: &[u8], is_owner: bool, joined_at: i64) -> Self {
        Self {
            id: key_id(public_key),
            name: name.to_string(),
            public_key: hex::encode(public_key),
            is_owner,
            joined_at,
        }
    }
}

/// Derives the stable identifier for a public key: the first 16 lowercase
/// hex chars (8 bytes) of SHA-256 over the key bytes.
pub fn key_id(public_key: &[u8]) -> String {
    let digest = Sha256::digest(public_key);
    hex::encode(&digest[..8])
}

/// Injected key-holder lookup capability.
///
/// The consent engine references policy key-holder data but must not own the
/// policy lifecycle, so the lookup is passed in as a trait object rather
/// than a back-pointer.
pub trait KeyHolderDirectory: Send + Sync {
    /// Looks up a holder by its stable id.
    fn key_holder(&self, key_id: &str) -> Option<KeyHolder>;

    /// All configured holders, in roster order.
    fn key_holders(&self) -> Vec<KeyHolder>;
}

/// A fixed in-memory roster, useful wherever the holder set is known up
/// front (configuration load, tests).
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    holders: Vec<KeyHolder>,
}

impl StaticDirectory {
    /// Builds a directory over a fixed holder set.
    pub fn new(holders: Vec<KeyHolder>) -> Self {
        Self { holders }
    }
}

impl KeyHolderDirectory for StaticDirectory {
    fn key_holder(&self, key_id: &str) -> Option<KeyHolder> {
        self.holders.iter().find(|h| h.id == key_id).cloned()
    }

    fn key_holders(&self) -> Vec<KeyHolder> {
        self.holders.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_id_is_16_hex_chars() {
        let id = key_id(&[7u8; 32]);
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn holder_id_matches_key_id() {
        let pk = [3u8; 32];
        let holder = KeyHolder::from_public_key("alice", &pk, false, 1_700_000_000);
        assert_eq!(holder.id, key_id(&pk));
        assert_eq!(holder.public_key, hex::encode(pk));
    }

    #[test]
    fn static_directory_lookup() {
        let holder = KeyHolder::from_public_key("bob", &[9u8; 32], true, 0);
        let dir = StaticDirectory::new(vec![holder.clone()]);
        assert_eq!(dir.key_holder(&holder.id).unwrap().name, "bob");
        assert!(dir.key_holder("ffffffffffffffff").is_none());
    }
}
