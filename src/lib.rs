//! hush: end-to-end key management for conversation messages.
//!
//! The backend only ever stores ciphertext. Each device holds an RSA keypair;
//! each conversation has a symmetric key wrapped once per participant device;
//! messages travel as `wrappedKey[:wrappedKeyByPin]:cipherText` envelopes. A
//! user PIN derives a master unlock key that lets any of the user's devices
//! read messages sealed for another of them.
//!
//! Start with [`Session`]; the other modules are the pieces it is built from.

pub mod cipher;
pub mod config;
pub mod device;
pub mod error;
pub mod keys;
pub mod migration;
pub mod secure_storage;
pub mod session;
pub mod store;
pub mod vault;

pub use cipher::{DecryptContext, DecryptStrategy, Decrypted, MessageCipher};
pub use config::{PinWrapPlacement, SessionOptions};
pub use device::{DeviceIdentityManager, LocalDevice};
pub use error::{DecryptError, Error, Result, UnavailableReason};
pub use keys::{ConversationKey, ConversationKeyManager, KeyCache};
pub use migration::{MigrationAgent, MigrationOutcome, SkipReason};
pub use secure_storage::{MemorySecureStorage, SecureStorage, SecureStorageError};
#[cfg(feature = "sqlite")]
pub use secure_storage::SqliteSecureStorage;
pub use session::{OutgoingMessage, Session, SessionDeps, UnlockOutcome};
pub use store::{
    ConversationKeyRow, ConversationKeyStore, KeyDirectory, MemoryBackend, MessageStore,
    PinCredential, PinCredentialStore, PinWrapPatch, StoreError, StoredMessage,
};
pub use vault::PinVault;

pub use hush_crypto as crypto;
pub use hush_envelope as envelope;
