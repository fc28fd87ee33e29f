//! k-of-n secret sharing over GF(256).
//!
//! Arithmetic is in the field GF(2^8) with the irreducible polynomial
//! 0x11b (the AES field). Each secret byte is the constant term of a
//! random degree-(k-1) polynomial; share `i` carries the polynomial
//! evaluated at `x = i`. Combining any k distinct shares interpolates the
//! constant term back out. Combining fewer than k shares, or shares with a
//! tampered byte, yields arbitrary bytes; detection is the caller's
//! responsibility, typically by comparing SHA-256 of the reconstruction to
//! an out-of-band hash.

use crate::error::CryptoError;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// One share of a split secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    /// Evaluation index in 1..=n; never zero.
    pub index: u8,
    /// Share bytes, one per secret byte.
    pub data: Vec<u8>,
}

fn gf_mul(mut a: u8, mut b: u8) -> u8 {
    let mut product = 0u8;
    while b != 0 {
        if b & 1 != 0 {
            product ^= a;
        }
        let carry = a & 0x80;
        a <<= 1;
        if carry != 0 {
            a ^= 0x1b; // reduce by x^8 + x^4 + x^3 + x + 1
        }
        b >>= 1;
    }
    product
}

fn gf_pow(mut base: u8, mut exp: u32) -> u8 {
    let mut result = 1u8;
    while exp != 0 {
        if exp & 1 != 0 {
            result = gf_mul(result, base);
        }
        base = gf_mul(base, base);
        exp >>= 1;
    }
    result
}

fn gf_inv(a: u8) -> u8 {
    // a^254 = a^-1 in GF(2^8); zero has no inverse and is rejected upstream.
    gf_pow(a, 254)
}

fn eval_poly(coeffs: &[u8], x: u8) -> u8 {
    // Horner's rule, highest coefficient first.
    let mut acc = 0u8;
    for &c in coeffs.iter().rev() {
        acc = gf_mul(acc, x) ^ c;
    }
    acc
}

/// Splits `secret` into `n` shares, any `k` of which reconstruct it.
///
/// Requires `1 <= k <= n <= 255` and a non-empty secret. `k = 1` permits
/// any single share to reconstruct (solo mode).
pub fn split(secret: &[u8], k: u8, n: u8) -> Result<Vec<Share>, CryptoError> {
    if secret.is_empty() {
        return Err(CryptoError::InvalidShares("secret is empty".into()));
    }
    if k == 0 {
        return Err(CryptoError::InvalidShares("threshold k must be >= 1".into()));
    }
    if k > n {
        return Err(CryptoError::InvalidShares(format!(
            "threshold k = {} exceeds share count n = {}",
            k, n
        )));
    }

    let mut shares: Vec<Share> = (1..=n)
        .map(|index| Share {
            index,
            data: Vec::with_capacity(secret.len()),
        })
        .collect();

    let mut coeffs = vec![0u8; k as usize];
    for &byte in secret {
        coeffs[0] = byte;
        if k > 1 {
            OsRng.fill_bytes(&mut coeffs[1..]);
        }
        for share in &mut shares {
            share.data.push(eval_poly(&coeffs, share.index));
        }
    }
    Ok(shares)
}

/// Reconstructs a secret from shares via Lagrange interpolation at x = 0.
///
/// Shares must be non-empty, of equal length, with distinct non-zero
/// indices. Fewer than the original threshold yields garbage, not an
/// error; the field cannot tell.
pub fn combine(shares: &[Share]) -> Result<Vec<u8>, CryptoError> {
    if shares.is_empty() {
        return Err(CryptoError::InvalidShares("no shares supplied".into()));
    }
    let len = shares[0].data.len();
    if len == 0 {
        return Err(CryptoError::InvalidShares("shares are empty".into()));
    }
    for share in shares {
        if share.index == 0 {
            return Err(CryptoError::InvalidShares("share index 0 is invalid".into()));
        }
        if share.data.len() != len {
            return Err(CryptoError::InvalidShares(
                "shares have differing lengths".into(),
            ));
        }
    }
    for (i, a) in shares.iter().enumerate() {
        if shares[i + 1..].iter().any(|b| b.index == a.index) {
            return Err(CryptoError::InvalidShares(format!(
                "duplicate share index {}",
                a.index
            )));
        }
    }

    let mut secret = vec![0u8; len];
    for (pos, byte) in secret.iter_mut().enumerate() {
        let mut acc = 0u8;
        for a in shares {
            // Lagrange basis at x = 0 for this share's index.
            let mut basis = 1u8;
            for b in shares {
                if b.index != a.index {
                    let numerator = b.index;
                    let denominator = a.index ^ b.index;
                    basis = gf_mul(basis, gf_mul(numerator, gf_inv(denominator)));
                }
            }
            acc ^= gf_mul(a.data[pos], basis);
        }
        *byte = acc;
    }
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_combine_roundtrip() {
        let secret = b"owner vault password".to_vec();
        let shares = split(&secret, 3, 5).unwrap();
        assert_eq!(shares.len(), 5);
        assert!(shares.iter().all(|s| s.data.len() == secret.len()));

        // Any 3 distinct shares reconstruct.
        let subset = vec![shares[4].clone(), shares[0].clone(), shares[2].clone()];
        assert_eq!(combine(&subset).unwrap(), secret);
    }

    #[test]
    fn all_k_subsets_of_small_split_agree() {
        let secret = vec![0xde, 0xad, 0xbe, 0xef];
        let shares = split(&secret, 2, 4).unwrap();
        for i in 0..shares.len() {
            for j in i + 1..shares.len() {
                let pair = vec![shares[i].clone(), shares[j].clone()];
                assert_eq!(combine(&pair).unwrap(), secret);
            }
        }
    }

    #[test]
    fn solo_mode_single_share() {
        let secret = b"solo".to_vec();
        let shares = split(&secret, 1, 3).unwrap();
        for share in &shares {
            assert_eq!(combine(&[share.clone()]).unwrap(), secret);
        }
    }

    #[test]
    fn under_threshold_yields_wrong_bytes() {
        let secret = b"under-threshold secret material".to_vec();
        let shares = split(&secret, 3, 5).unwrap();
        let two = vec![shares[0].clone(), shares[1].clone()];
        // Interpolating below the threshold is well-defined but wrong with
        // overwhelming probability for a secret this long.
        assert_ne!(combine(&two).unwrap(), secret);
    }

    #[test]
    fn tampered_share_corrupts_silently() {
        let secret = b"tamper-evidence lives elsewhere".to_vec();
        let shares = split(&secret, 2, 3).unwrap();
        let mut bad = vec![shares[0].clone(), shares[1].clone()];
        bad[1].data[0] ^= 0x55;
        let out = combine(&bad).unwrap();
        assert_eq!(out.len(), secret.len());
        assert_ne!(out, secret);
    }

    #[test]
    fn parameter_validation() {
        assert!(split(b"", 1, 1).is_err());
        assert!(split(b"s", 0, 1).is_err());
        assert!(split(b"s", 3, 2).is_err());
        assert!(combine(&[]).is_err());

        let shares = split(b"xy", 2, 2).unwrap();
        let dup = vec![shares[0].clone(), shares[0].clone()];
        assert!(combine(&dup).is_err());
    }

    #[test]
    fn field_arithmetic_spot_checks() {
        // 0x53 * 0xCA = 0x01 in the AES field.
        assert_eq!(gf_mul(0x53, 0xca), 0x01);
        assert_eq!(gf_inv(0x53), 0xca);
        assert_eq!(gf_mul(0, 0x7f), 0);
    }
}
