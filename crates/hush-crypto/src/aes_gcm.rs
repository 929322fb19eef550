//! AES-256-GCM payloads.
//!
//! Wire format (before base64):
//! [12 bytes: IV][N bytes: ciphertext][16 bytes: tag]
//!
//! No version byte and no AAD: the format has to stay readable by the other
//! runtimes that already produce it.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use zeroize::Zeroizing;

use crate::base64::{base64_decode, base64_encode};
use crate::error::CryptoError;
use crate::types::{AES_GCM_IV_LENGTH, AES_GCM_TAG_LENGTH, AES_KEY_LENGTH};

/// A 256-bit symmetric key that zeroizes on drop.
pub type SymmetricKey = Zeroizing<[u8; AES_KEY_LENGTH]>;

/// Generate a random 12-byte IV for AES-GCM.
pub fn generate_iv() -> Result<[u8; AES_GCM_IV_LENGTH], CryptoError> {
    let mut iv = [0u8; AES_GCM_IV_LENGTH];
    getrandom::getrandom(&mut iv).map_err(|e| CryptoError::RngFailed(e.to_string()))?;
    Ok(iv)
}

/// Generate a random 256-bit symmetric key.
pub fn generate_key() -> Result<SymmetricKey, CryptoError> {
    let mut key = Zeroizing::new([0u8; AES_KEY_LENGTH]);
    getrandom::getrandom(&mut key[..]).map_err(|e| CryptoError::RngFailed(e.to_string()))?;
    Ok(key)
}

/// Copy a byte slice into a [`SymmetricKey`], checking its length.
pub fn key_from_slice(bytes: &[u8]) -> Result<SymmetricKey, CryptoError> {
    if bytes.len() != AES_KEY_LENGTH {
        return Err(CryptoError::InvalidKeyLength {
            expected: AES_KEY_LENGTH,
            got: bytes.len(),
        });
    }
    let mut key = Zeroizing::new([0u8; AES_KEY_LENGTH]);
    key.copy_from_slice(bytes);
    Ok(key)
}

fn cipher_for(key: &[u8]) -> Result<Aes256Gcm, CryptoError> {
    if key.len() != AES_KEY_LENGTH {
        return Err(CryptoError::InvalidKeyLength {
            expected: AES_KEY_LENGTH,
            got: key.len(),
        });
    }
    Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
}

/// Encrypt raw bytes with AES-256-GCM.
///
/// Returns: [IV:12B][ciphertext][tag:16B]
pub fn aes_gcm_encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = cipher_for(key)?;
    let iv = generate_iv()?;
    let nonce = Nonce::from_slice(&iv);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut result = Vec::with_capacity(AES_GCM_IV_LENGTH + ciphertext.len());
    result.extend_from_slice(&iv);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt raw bytes with AES-256-GCM (expects [IV:12][ciphertext+tag]).
pub fn aes_gcm_decrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = cipher_for(key)?;
    if data.len() < AES_GCM_IV_LENGTH + AES_GCM_TAG_LENGTH {
        return Err(CryptoError::DataTooShort);
    }
    let (iv, ciphertext) = data.split_at(AES_GCM_IV_LENGTH);
    let nonce = Nonce::from_slice(iv);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// Encrypt and base64-encode a payload.
pub fn encrypt_payload(key: &[u8], plaintext: &[u8]) -> Result<String, CryptoError> {
    Ok(base64_encode(&aes_gcm_encrypt(key, plaintext)?))
}

/// Decode and decrypt a base64 payload produced by [`encrypt_payload`].
pub fn decrypt_payload(key: &[u8], payload: &str) -> Result<Vec<u8>, CryptoError> {
    let data = base64_decode(payload)?;
    aes_gcm_decrypt(key, &data)
}
