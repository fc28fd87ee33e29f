//! Ed25519 signing and verification.
//!
//! Keys cross API boundaries as raw byte slices: 32-byte public keys and
//! 64-byte private keys (seed followed by public half, the keypair layout
//! `ed25519-dalek` persists). Signatures are 64 bytes. [`verify`] never
//! errors; any malformed input is simply an invalid signature.

use crate::error::CryptoError;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

pub use vaultward_types::identity::key_id;

/// Ed25519 public key length in bytes.
pub const PUBLIC_KEY_LEN: usize = 32;
/// Ed25519 private (keypair) key length in bytes.
pub const SECRET_KEY_LEN: usize = 64;
/// Ed25519 signature length in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// Generates a fresh Ed25519 identity.
///
/// Returns `(public_key, private_key)`; the private half is zeroized on
/// drop. Fails only if the operating-system RNG fails.
pub fn generate_identity() -> Result<(Vec<u8>, Zeroizing<Vec<u8>>), CryptoError> {
    let mut seed = Zeroizing::new([0u8; 32]);
    OsRng
        .try_fill_bytes(seed.as_mut())
        .map_err(|e| CryptoError::OperationFailed(format!("OS RNG failure: {}", e)))?;
    let signing = SigningKey::from_bytes(&seed);
    let public = signing.verifying_key().to_bytes().to_vec();
    let private = Zeroizing::new(signing.to_keypair_bytes().to_vec());
    Ok((public, private))
}

/// Signs `message` with a 64-byte private key, returning the raw signature.
pub fn sign(private_key: &[u8], message: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if private_key.len() != SECRET_KEY_LEN {
        return Err(CryptoError::InvalidKeySize {
            expected: SECRET_KEY_LEN,
            got: private_key.len(),
        });
    }
    let mut keypair = [0u8; SECRET_KEY_LEN];
    keypair.copy_from_slice(private_key);
    let signing = SigningKey::from_keypair_bytes(&keypair)
        .map_err(|e| CryptoError::OperationFailed(format!("malformed keypair: {}", e)))?;
    Ok(signing.sign(message).to_bytes().to_vec())
}

/// Verifies `signature` over `message` with a 32-byte public key.
///
/// Returns `false` on any size mismatch, malformed key, or verification
/// failure; this function never errors.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(pk_bytes) = <[u8; PUBLIC_KEY_LEN]>::try_from(public_key) else {
        return false;
    };
    let Ok(verifying) = VerifyingKey::from_bytes(&pk_bytes) else {
        return false;
    };
    let Ok(sig) = Signature::from_slice(signature) else {
        return false;
    };
    verifying.verify(message, &sig).is_ok()
}

/// Signs `message` and hex-encodes the signature.
pub fn sign_to_hex(private_key: &[u8], message: &[u8]) -> Result<String, CryptoError> {
    Ok(hex::encode(sign(private_key, message)?))
}

/// Verifies a hex signature over `message` with a hex public key.
///
/// Like [`verify`], any decode failure is an invalid signature.
pub fn verify_hex(public_key_hex: &str, message: &[u8], signature_hex: &str) -> bool {
    let Ok(public_key) = hex::decode(public_key_hex) else {
        return false;
    };
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    verify(&public_key, message, &signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let (public, private) = generate_identity().unwrap();
        let msg = b"consequential operation";
        let sig = sign(&private, msg).unwrap();
        assert_eq!(sig.len(), SIGNATURE_LEN);
        assert!(verify(&public, msg, &sig));
    }

    #[test]
    fn verify_rejects_wrong_message_and_key() {
        let (public, private) = generate_identity().unwrap();
        let (other_public, _) = generate_identity().unwrap();
        let sig = sign(&private, b"m").unwrap();
        assert!(!verify(&public, b"m2", &sig));
        assert!(!verify(&other_public, b"m", &sig));
    }

    #[test]
    fn verify_never_errors_on_garbage() {
        assert!(!verify(b"short", b"m", b"sig"));
        assert!(!verify(&[0u8; 32], b"m", &[0u8; 64]));
        assert!(!verify(&[0u8; 31], b"m", &[0u8; 64]));
        assert!(!verify(&[0u8; 32], b"m", &[0u8; 63]));
    }

    #[test]
    fn sign_rejects_bad_key_size() {
        let err = sign(&[0u8; 32], b"m").unwrap_err();
        match err {
            CryptoError::InvalidKeySize { expected, got } => {
                assert_eq!(expected, SECRET_KEY_LEN);
                assert_eq!(got, 32);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn hex_roundtrip() {
        let (public, private) = generate_identity().unwrap();
        let sig = sign_to_hex(&private, b"m").unwrap();
        assert!(verify_hex(&hex::encode(&public), b"m", &sig));
        assert!(!verify_hex("zz", b"m", &sig));
    }

    #[test]
    fn key_id_is_stable_prefix() {
        let (public, _) = generate_identity().unwrap();
        let id = key_id(&public);
        assert_eq!(id.len(), 16);
        assert_eq!(id, key_id(&public));
    }
}
