//! Device identity: one RSA keypair and device id per user per installation.
//!
//! The identity is persisted to [`SecureStorage`] before the public key is
//! published. A failed publish leaves the identity stored but unpublished and
//! the next [`DeviceIdentityManager::ensure`] retries it, so a device id is
//! never regenerated just because the network was down.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hush_crypto::{CryptoProvider, DeviceKeyPair, RsaPublicKey};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{Error, Result};
use crate::secure_storage::{SecureStorage, SecureStorageError};
use crate::store::KeyDirectory;

/// This device's identity, loaded and ready to unwrap keys.
pub struct LocalDevice {
    user_id: String,
    device_id: String,
    keys: DeviceKeyPair,
    public_pem: String,
    created_at: DateTime<Utc>,
}

impl LocalDevice {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn keys(&self) -> &DeviceKeyPair {
        &self.keys
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        self.keys.public_key()
    }

    /// SPKI PEM as published to the key directory.
    pub fn public_key_pem(&self) -> &str {
        &self.public_pem
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl std::fmt::Debug for LocalDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalDevice")
            .field("user_id", &self.user_id)
            .field("device_id", &self.device_id)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Serialized form kept in secure storage.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
struct StoredIdentity {
    user_id: String,
    device_id: String,
    public_key: String,
    private_key: String,
    #[zeroize(skip)]
    created_at: DateTime<Utc>,
    published: bool,
}

fn storage_key(user_id: &str) -> String {
    format!("hush:device:{user_id}")
}

pub struct DeviceIdentityManager {
    storage: Arc<dyn SecureStorage>,
    directory: Arc<dyn KeyDirectory>,
    provider: Arc<dyn CryptoProvider>,
    current: RwLock<Option<Arc<LocalDevice>>>,
    /// Serializes first-use creation so concurrent callers share one identity.
    creating: tokio::sync::Mutex<()>,
}

impl DeviceIdentityManager {
    pub fn new(
        storage: Arc<dyn SecureStorage>,
        directory: Arc<dyn KeyDirectory>,
        provider: Arc<dyn CryptoProvider>,
    ) -> Self {
        Self {
            storage,
            directory,
            provider,
            current: RwLock::new(None),
            creating: tokio::sync::Mutex::new(()),
        }
    }

    /// The loaded identity, if `ensure` has succeeded.
    pub fn current(&self) -> Option<Arc<LocalDevice>> {
        self.current.read().clone()
    }

    /// Load or create this device's identity for `user_id`, publishing it if
    /// that has not yet succeeded.
    pub async fn ensure(&self, user_id: &str) -> Result<Arc<LocalDevice>> {
        if let Some(device) = self.cached(user_id) {
            return Ok(device);
        }
        let _guard = self.creating.lock().await;
        if let Some(device) = self.cached(user_id) {
            return Ok(device);
        }
        if !self.storage.is_available() {
            return Err(SecureStorageError::Unavailable.into());
        }

        let (identity, keys) = match self.load(user_id)? {
            Some(loaded) => loaded,
            None => self.create(user_id).await?,
        };
        self.activate(identity, keys).await
    }

    /// Replace this device's keypair and device id.
    ///
    /// Destructive: keys wrapped for the old device can no longer be unwrapped
    /// here. Only call on explicit user request.
    pub async fn force_re_register(&self, user_id: &str) -> Result<Arc<LocalDevice>> {
        let _guard = self.creating.lock().await;
        if !self.storage.is_available() {
            return Err(SecureStorageError::Unavailable.into());
        }

        let old_device_id = self.load(user_id)?.map(|(identity, _)| identity.device_id.clone());
        warn!(
            user_id,
            old_device_id = old_device_id.as_deref().unwrap_or("none"),
            "re-registering device; keys wrapped for the old device become unreadable"
        );

        self.storage.delete(&storage_key(user_id))?;
        *self.current.write() = None;

        let (identity, keys) = self.create(user_id).await?;
        self.activate(identity, keys).await
    }

    fn cached(&self, user_id: &str) -> Option<Arc<LocalDevice>> {
        self.current
            .read()
            .as_ref()
            .filter(|d| d.user_id == user_id)
            .cloned()
    }

    fn load(&self, user_id: &str) -> Result<Option<(StoredIdentity, DeviceKeyPair)>> {
        let Some(raw) = self.storage.get(&storage_key(user_id))? else {
            return Ok(None);
        };
        let identity: StoredIdentity = serde_json::from_str(&raw)
            .map_err(|e| SecureStorageError::Corrupt(format!("device identity: {e}")))?;
        if identity.user_id != user_id {
            return Err(SecureStorageError::Corrupt(format!(
                "device identity belongs to another user: {}",
                identity.user_id
            ))
            .into());
        }
        let keys = DeviceKeyPair::from_private_pem(&identity.private_key)?;
        debug!(user_id, device_id = %identity.device_id, "loaded device identity");
        Ok(Some((identity, keys)))
    }

    async fn create(&self, user_id: &str) -> Result<(StoredIdentity, DeviceKeyPair)> {
        let provider = Arc::clone(&self.provider);
        let keys = tokio::task::spawn_blocking(move || provider.generate_device_keys())
            .await
            .map_err(|e| Error::Task(e.to_string()))??;

        let private_pem = keys.private_pem()?;
        let identity = StoredIdentity {
            user_id: user_id.to_string(),
            device_id: Uuid::new_v4().to_string(),
            public_key: keys.public_pem()?,
            private_key: private_pem.as_str().to_string(),
            created_at: Utc::now(),
            published: false,
        };
        self.save(&identity)?;
        info!(user_id, device_id = %identity.device_id, "created device identity");
        Ok((identity, keys))
    }

    fn save(&self, identity: &StoredIdentity) -> Result<()> {
        let json = Zeroizing::new(
            serde_json::to_string(identity)
                .map_err(|e| SecureStorageError::Corrupt(format!("device identity: {e}")))?,
        );
        self.storage.put(&storage_key(&identity.user_id), &json)?;
        Ok(())
    }

    async fn activate(
        &self,
        mut identity: StoredIdentity,
        keys: DeviceKeyPair,
    ) -> Result<Arc<LocalDevice>> {
        if !identity.published {
            self.directory
                .publish(&identity.user_id, &identity.device_id, &identity.public_key)
                .await
                .map_err(|e| {
                    warn!(
                        user_id = %identity.user_id,
                        device_id = %identity.device_id,
                        error = %e,
                        "publishing device key failed"
                    );
                    Error::Directory(e)
                })?;
            identity.published = true;
            self.save(&identity)?;
            info!(
                user_id = %identity.user_id,
                device_id = %identity.device_id,
                "published device key"
            );
        }

        let device = Arc::new(LocalDevice {
            user_id: identity.user_id.clone(),
            device_id: identity.device_id.clone(),
            public_pem: identity.public_key.clone(),
            created_at: identity.created_at,
            keys,
        });
        *self.current.write() = Some(Arc::clone(&device));
        Ok(device)
    }
}
