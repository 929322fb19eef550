//! PIN credential material.
//!
//! verifier  = SHA-256(pin UTF-8 ‖ salt)             (held server-side)
//! masterKey = PBKDF2-HMAC-SHA256(pin, salt, 100000)  (memory only)
//!
//! The same PIN and salt always produce the same master key, which is what
//! lets a second device of the same user unwrap PIN-wrapped keys.

use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::aes_gcm::SymmetricKey;
use crate::error::CryptoError;
use crate::types::{AES_KEY_LENGTH, PIN_LENGTH, PIN_SALT_LENGTH, SHA256_LENGTH};

/// Validate PIN format: exactly six ASCII digits.
pub fn is_valid_pin(pin: &str) -> bool {
    pin.len() == PIN_LENGTH && pin.bytes().all(|b| b.is_ascii_digit())
}

/// Generate a random 16-byte PIN salt.
pub fn generate_pin_salt() -> Result<[u8; PIN_SALT_LENGTH], CryptoError> {
    let mut salt = [0u8; PIN_SALT_LENGTH];
    getrandom::getrandom(&mut salt).map_err(|e| CryptoError::RngFailed(e.to_string()))?;
    Ok(salt)
}

/// Compute the server-side PIN verifier: SHA-256(pin ‖ salt).
pub fn hash_pin(pin: &str, salt: &[u8]) -> [u8; SHA256_LENGTH] {
    let mut hasher = Sha256::new();
    hasher.update(pin.as_bytes());
    hasher.update(salt);
    hasher.finalize().into()
}

/// Check a candidate PIN against a stored verifier without early exit.
pub fn verify_pin_hash(pin: &str, salt: &[u8], expected: &[u8]) -> bool {
    constant_time_eq(&hash_pin(pin, salt), expected)
}

/// Byte comparison whose running time depends only on the lengths.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Derive the 32-byte master unlock key from a PIN.
///
/// Pure function of its inputs. At the default iteration count this takes
/// tens of milliseconds; keep it off interactive threads.
pub fn derive_unlock_key(
    pin: &str,
    salt: &[u8],
    iterations: u32,
) -> Result<SymmetricKey, CryptoError> {
    if iterations == 0 {
        return Err(CryptoError::KeyDerivationFailed(
            "iteration count must be positive".to_string(),
        ));
    }
    let mut key = Zeroizing::new([0u8; AES_KEY_LENGTH]);
    pbkdf2_hmac::<Sha256>(pin.as_bytes(), salt, iterations, &mut key[..]);
    Ok(key)
}
