use thiserror::Error;

use crate::secure_storage::SecureStorageError;
use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Key directory error: {0}")]
    Directory(#[source] StoreError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Secure storage error: {0}")]
    SecureStorage(#[from] SecureStorageError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] hush_crypto::CryptoError),

    #[error("Envelope error: {0}")]
    Envelope(#[from] hush_envelope::EnvelopeError),

    #[error("Invalid PIN: must be exactly {} digits", hush_crypto::PIN_LENGTH)]
    InvalidPin,

    #[error("Wrong PIN")]
    WrongPin,

    #[error("No PIN set for user {0}")]
    PinNotSet(String),

    #[error("PIN vault is locked")]
    Locked,

    #[error("Corrupt PIN credential for user {0}")]
    CorruptPinCredential(String),

    #[error("Session is closed")]
    SessionClosed,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Why no key was available to decrypt a message on this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// Sent from another device and the PIN vault is locked.
    Locked,
    /// Vault is unlocked but the message carries no PIN-wrapped key.
    NoPinWrappedKey,
    /// This device holds no conversation key row that decrypts the message.
    NoConversationKey,
    /// This device has no usable identity.
    NoIdentity,
    SessionClosed,
}

impl std::fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Locked => "PIN vault is locked",
            Self::NoPinWrappedKey => "message has no PIN-wrapped key",
            Self::NoConversationKey => "no conversation key for this device",
            Self::NoIdentity => "no device identity",
            Self::SessionClosed => "session is closed",
        };
        f.write_str(s)
    }
}

/// Every way a message can fail to decrypt.
///
/// Callers render all of these as a fixed "encrypted message" placeholder;
/// the variants exist for tests and logs.
#[derive(Debug, Error)]
pub enum DecryptError {
    #[error("Malformed envelope: {0}")]
    Format(#[from] hush_envelope::EnvelopeError),

    #[error("Unwrapped key has wrong length: expected {expected} bytes, got {got}")]
    KeyMismatch { expected: usize, got: usize },

    #[error("No key available: {0}")]
    UnavailableKey(UnavailableReason),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Decrypted content is not valid UTF-8")]
    InvalidUtf8,
}

impl From<hush_crypto::CryptoError> for DecryptError {
    fn from(e: hush_crypto::CryptoError) -> Self {
        match e {
            hush_crypto::CryptoError::InvalidKeyLength { expected, got } => {
                Self::KeyMismatch { expected, got }
            }
            other => Self::Authentication(other.to_string()),
        }
    }
}

impl DecryptError {
    /// Map an error from unwrapping or decrypting (not parsing) to a decrypt error.
    pub(crate) fn from_unwrap(e: hush_envelope::EnvelopeError) -> Self {
        match e {
            hush_envelope::EnvelopeError::Crypto(c) => c.into(),
            other => Self::Format(other),
        }
    }
}
