use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Encrypted data too short")]
    DataTooShort,

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("RSA key generation failed: {0}")]
    KeyGenerationFailed(String),

    #[error("RSA wrap failed: {0}")]
    WrapFailed(String),

    #[error("RSA unwrap failed: {0}")]
    UnwrapFailed(String),

    #[error("Invalid PEM: {0}")]
    InvalidPem(String),

    #[error("Invalid base64: {0}")]
    InvalidBase64(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Random number generation failed: {0}")]
    RngFailed(String),
}
