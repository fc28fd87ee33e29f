//! Random identifiers, nonces, and recovery codes.

use rand::rngs::OsRng;
use rand::RngCore;

/// A random 8-byte identifier as 16 lowercase hex chars.
///
/// Used for requests, tickets, challenges, audit entries, and heartbeats.
pub fn random_id() -> String {
    let mut bytes = [0u8; 8];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// A random 16-byte nonce as 32 lowercase hex chars.
pub fn random_nonce() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// A random 128-bit recovery code as 32 lowercase hex chars.
///
/// Generated exactly on the dead-man switch's transition into `dead`.
pub fn random_recovery_code() -> String {
    random_nonce()
}
