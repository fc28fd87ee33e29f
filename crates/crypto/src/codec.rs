//! Length-checked hex codecs for key and signature material.

use crate::error::CryptoError;
use crate::sign::{PUBLIC_KEY_LEN, SECRET_KEY_LEN, SIGNATURE_LEN};
use zeroize::Zeroizing;

fn decode_exact(field: &'static str, input: &str, expected: usize) -> Result<Vec<u8>, CryptoError> {
    let bytes = hex::decode(input).map_err(|e| CryptoError::InvalidHex {
        field,
        reason: e.to_string(),
    })?;
    if bytes.len() != expected {
        return Err(CryptoError::InvalidHex {
            field,
            reason: format!("expected {} bytes, got {}", expected, bytes.len()),
        });
    }
    Ok(bytes)
}

/// Decodes a hex public key, requiring exactly 32 bytes.
pub fn decode_public_key(input: &str) -> Result<Vec<u8>, CryptoError> {
    decode_exact("public_key", input, PUBLIC_KEY_LEN)
}

/// Decodes a hex private key, requiring exactly 64 bytes. The buffer is
/// zeroized on drop.
pub fn decode_private_key(input: &str) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    Ok(Zeroizing::new(decode_exact(
        "private_key",
        input,
        SECRET_KEY_LEN,
    )?))
}

/// Decodes a hex signature, requiring exactly 64 bytes.
pub fn decode_signature(input: &str) -> Result<Vec<u8>, CryptoError> {
    decode_exact("signature", input, SIGNATURE_LEN)
}
