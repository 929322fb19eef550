//! The single seam through which services reach cryptographic primitives.
//!
//! A provider is chosen once when a session is built and shared from then on.
//! [`SoftwareProvider`] backs every operation with the pure-Rust primitives in
//! this crate.

use rsa::RsaPublicKey;

use crate::aes_gcm::{self, SymmetricKey};
use crate::error::CryptoError;
use crate::pin;
use crate::rsa_wrap::{self, DeviceKeyPair};
use crate::types::{PIN_SALT_LENGTH, SHA256_LENGTH};

pub trait CryptoProvider: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &'static str;

    fn generate_symmetric_key(&self) -> Result<SymmetricKey, CryptoError>;

    /// AES-256-GCM encrypt, returning the base64 `IV ‖ ciphertext ‖ tag` payload.
    fn encrypt_payload(&self, key: &[u8], plaintext: &[u8]) -> Result<String, CryptoError>;

    fn decrypt_payload(&self, key: &[u8], payload: &str) -> Result<Vec<u8>, CryptoError>;

    fn generate_device_keys(&self) -> Result<DeviceKeyPair, CryptoError>;

    fn wrap_for_device(&self, public_key: &RsaPublicKey, key: &[u8]) -> Result<Vec<u8>, CryptoError>;

    fn unwrap_on_device(
        &self,
        keys: &DeviceKeyPair,
        wrapped: &[u8],
    ) -> Result<SymmetricKey, CryptoError>;

    fn generate_pin_salt(&self) -> Result<[u8; PIN_SALT_LENGTH], CryptoError>;

    fn hash_pin(&self, pin: &str, salt: &[u8]) -> [u8; SHA256_LENGTH];

    fn derive_unlock_key(
        &self,
        pin: &str,
        salt: &[u8],
        iterations: u32,
    ) -> Result<SymmetricKey, CryptoError>;
}

/// Pure-Rust provider (RustCrypto `aes-gcm`, `rsa`, `pbkdf2`, `sha2`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareProvider;

impl CryptoProvider for SoftwareProvider {
    fn name(&self) -> &'static str {
        "software"
    }

    fn generate_symmetric_key(&self) -> Result<SymmetricKey, CryptoError> {
        aes_gcm::generate_key()
    }

    fn encrypt_payload(&self, key: &[u8], plaintext: &[u8]) -> Result<String, CryptoError> {
        aes_gcm::encrypt_payload(key, plaintext)
    }

    fn decrypt_payload(&self, key: &[u8], payload: &str) -> Result<Vec<u8>, CryptoError> {
        aes_gcm::decrypt_payload(key, payload)
    }

    fn generate_device_keys(&self) -> Result<DeviceKeyPair, CryptoError> {
        DeviceKeyPair::generate()
    }

    fn wrap_for_device(&self, public_key: &RsaPublicKey, key: &[u8]) -> Result<Vec<u8>, CryptoError> {
        rsa_wrap::wrap_key(public_key, key)
    }

    fn unwrap_on_device(
        &self,
        keys: &DeviceKeyPair,
        wrapped: &[u8],
    ) -> Result<SymmetricKey, CryptoError> {
        keys.unwrap_key(wrapped)
    }

    fn generate_pin_salt(&self) -> Result<[u8; PIN_SALT_LENGTH], CryptoError> {
        pin::generate_pin_salt()
    }

    fn hash_pin(&self, pin: &str, salt: &[u8]) -> [u8; SHA256_LENGTH] {
        pin::hash_pin(pin, salt)
    }

    fn derive_unlock_key(
        &self,
        pin: &str,
        salt: &[u8],
        iterations: u32,
    ) -> Result<SymmetricKey, CryptoError> {
        pin::derive_unlock_key(pin, salt, iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn usable_as_trait_object() {
        let provider: Arc<dyn CryptoProvider> = Arc::new(SoftwareProvider);
        let key = provider.generate_symmetric_key().unwrap();
        let payload = provider.encrypt_payload(&key[..], b"hello").unwrap();
        assert_eq!(provider.decrypt_payload(&key[..], &payload).unwrap(), b"hello");
        assert_eq!(provider.name(), "software");
    }
}
