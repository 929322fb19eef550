pub mod aes_gcm;
pub mod base64;
pub mod error;
pub mod pin;
pub mod provider;
pub mod rsa_wrap;
pub mod types;

pub use crate::aes_gcm::{
    aes_gcm_decrypt, aes_gcm_encrypt, decrypt_payload, encrypt_payload, generate_key,
    key_from_slice, SymmetricKey,
};
pub use base64::{base64_decode, base64_encode};
pub use error::CryptoError;
pub use pin::{
    constant_time_eq, derive_unlock_key, generate_pin_salt, hash_pin, is_valid_pin, verify_pin_hash,
};
pub use provider::{CryptoProvider, SoftwareProvider};
pub use rsa::RsaPublicKey;
pub use rsa_wrap::{export_public_pem, import_public_pem, unwrap_key, wrap_key, DeviceKeyPair};
pub use types::{
    AES_GCM_IV_LENGTH, AES_GCM_TAG_LENGTH, AES_KEY_LENGTH, PBKDF2_ITERATIONS, PIN_LENGTH,
    PIN_SALT_LENGTH, RSA_KEY_BITS, RSA_WRAPPED_KEY_LENGTH, SHA256_LENGTH,
};
