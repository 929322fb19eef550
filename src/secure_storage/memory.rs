use std::collections::HashMap;

use parking_lot::Mutex;
use zeroize::Zeroizing;

use super::{SecureStorage, SecureStorageError};

/// Process-lifetime secret storage.
pub struct MemorySecureStorage {
    available: bool,
    items: Mutex<HashMap<String, Zeroizing<String>>>,
}

impl MemorySecureStorage {
    pub fn new() -> Self {
        Self {
            available: true,
            items: Mutex::new(HashMap::new()),
        }
    }

    /// A storage that reports itself unavailable and rejects every call.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            items: Mutex::new(HashMap::new()),
        }
    }

    fn check(&self) -> Result<(), SecureStorageError> {
        if self.available {
            Ok(())
        } else {
            Err(SecureStorageError::Unavailable)
        }
    }
}

impl Default for MemorySecureStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureStorage for MemorySecureStorage {
    fn is_available(&self) -> bool {
        self.available
    }

    fn get(&self, key: &str) -> Result<Option<Zeroizing<String>>, SecureStorageError> {
        self.check()?;
        Ok(self.items.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), SecureStorageError> {
        self.check()?;
        self.items
            .lock()
            .insert(key.to_string(), Zeroizing::new(value.to_string()));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), SecureStorageError> {
        self.check()?;
        self.items.lock().remove(key);
        Ok(())
    }
}
