//! PIN vault: holds the master unlock key while unlocked.
//!
//! The master key is `PBKDF2(pin, salt)` with the salt from the user's server
//! credential, so every device that knows the PIN derives the same key. It is
//! kept in memory only and dropped (zeroized) on lock.

use std::sync::Arc;

use hush_crypto::{
    base64_decode, base64_encode, constant_time_eq, is_valid_pin, CryptoProvider, SymmetricKey,
};
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::keys::KeyCache;
use crate::store::{PinCredential, PinCredentialStore};

pub struct PinVault {
    credentials: Arc<dyn PinCredentialStore>,
    provider: Arc<dyn CryptoProvider>,
    key_cache: Arc<KeyCache>,
    iterations: u32,
    master: RwLock<Option<SymmetricKey>>,
}

impl PinVault {
    pub fn new(
        credentials: Arc<dyn PinCredentialStore>,
        provider: Arc<dyn CryptoProvider>,
        key_cache: Arc<KeyCache>,
        iterations: u32,
    ) -> Self {
        Self {
            credentials,
            provider,
            key_cache,
            iterations,
            master: RwLock::new(None),
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.master.read().is_some()
    }

    pub fn master_unlock_key(&self) -> Option<SymmetricKey> {
        self.master.read().clone()
    }

    /// Like [`master_unlock_key`](Self::master_unlock_key) but locked is an error.
    pub fn require_master(&self) -> Result<SymmetricKey> {
        self.master_unlock_key().ok_or(Error::Locked)
    }

    /// Set or replace the user's PIN and unlock.
    ///
    /// Messages PIN-wrapped under a previous PIN stay bound to that PIN.
    pub async fn set_pin(&self, pin: &str, user_id: &str) -> Result<()> {
        if !is_valid_pin(pin) {
            return Err(Error::InvalidPin);
        }

        let salt = self.provider.generate_pin_salt()?;
        let hash = self.provider.hash_pin(pin, &salt);
        let credential = PinCredential {
            salt: base64_encode(&salt),
            hash: base64_encode(&hash),
        };
        self.credentials.upsert(user_id, &credential).await?;

        let master = self.derive(pin, salt.to_vec()).await?;
        *self.master.write() = Some(master);
        info!(user_id, "PIN set; vault unlocked");
        Ok(())
    }

    /// Verify `pin` against the stored credential and unlock.
    ///
    /// Any failure leaves the vault in the state it was in.
    pub async fn unlock_with_pin(&self, pin: &str, user_id: &str) -> Result<()> {
        if !is_valid_pin(pin) {
            return Err(Error::InvalidPin);
        }

        let credential = self
            .credentials
            .get(user_id)
            .await?
            .ok_or_else(|| Error::PinNotSet(user_id.to_string()))?;
        let salt = base64_decode(&credential.salt)
            .map_err(|_| Error::CorruptPinCredential(user_id.to_string()))?;
        let expected = base64_decode(&credential.hash)
            .map_err(|_| Error::CorruptPinCredential(user_id.to_string()))?;

        let candidate = self.provider.hash_pin(pin, &salt);
        if !constant_time_eq(&candidate, &expected) {
            warn!(user_id, "PIN verification failed");
            return Err(Error::WrongPin);
        }

        let master = self.derive(pin, salt).await?;
        *self.master.write() = Some(master);
        info!(user_id, "vault unlocked");
        Ok(())
    }

    /// Drop the master key and every cached conversation key.
    pub fn lock(&self) {
        let was_unlocked = self.master.write().take().is_some();
        self.key_cache.clear();
        if was_unlocked {
            info!("vault locked");
        } else {
            debug!("vault lock requested while already locked");
        }
    }

    pub async fn has_pin(&self, user_id: &str) -> Result<bool> {
        Ok(self.credentials.get(user_id).await?.is_some())
    }

    /// Delete the server credential and lock.
    pub async fn remove_pin(&self, user_id: &str) -> Result<()> {
        self.credentials.delete(user_id).await?;
        self.lock();
        info!(user_id, "PIN removed");
        Ok(())
    }

    async fn derive(&self, pin: &str, salt: Vec<u8>) -> Result<SymmetricKey> {
        let provider = Arc::clone(&self.provider);
        let pin = Zeroizing::new(pin.to_string());
        let iterations = self.iterations;
        let key = tokio::task::spawn_blocking(move || {
            provider.derive_unlock_key(&pin, &salt, iterations)
        })
        .await
        .map_err(|e| Error::Task(e.to_string()))??;
        Ok(key)
    }
}
