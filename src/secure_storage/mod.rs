//! Device-local secret storage for the device identity.
//!
//! Values are opaque strings. Implementations must keep them on the device;
//! nothing here is ever synced.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use thiserror::Error;
use zeroize::Zeroizing;

pub use memory::MemorySecureStorage;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSecureStorage;

#[derive(Debug, Error)]
pub enum SecureStorageError {
    #[error("Secure storage is unavailable on this device")]
    Unavailable,

    #[error("Secure storage backend error: {0}")]
    Backend(String),

    #[error("Stored value is corrupt: {0}")]
    Corrupt(String),
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for SecureStorageError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

pub trait SecureStorage: Send + Sync {
    /// False when the platform offers no secure storage at all.
    fn is_available(&self) -> bool;

    fn get(&self, key: &str) -> Result<Option<Zeroizing<String>>, SecureStorageError>;

    fn put(&self, key: &str, value: &str) -> Result<(), SecureStorageError>;

    /// Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), SecureStorageError>;
}
