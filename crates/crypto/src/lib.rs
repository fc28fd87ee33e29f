#![forbid(unsafe_code)]

//! # Vaultward Crypto
//!
//! Ed25519 identity operations, SHA-256 helpers, length-checked hex codecs,
//! k-of-n secret sharing over GF(256), and the on-disk keystore. Everything
//! either principal signs flows through [`sign`]; private key bytes are held
//! in zeroizing containers and never serialized outside the keystore.

pub mod codec;
pub mod error;
pub mod hash;
pub mod key_store;
pub mod nonce;
pub mod shamir;
pub mod sign;

pub use error::CryptoError;
pub use sign::{generate_identity, key_id, sign, verify, PUBLIC_KEY_LEN, SECRET_KEY_LEN, SIGNATURE_LEN};
