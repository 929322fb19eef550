//! Conversation keys: one 32-byte AES key per conversation, stored as one
//! RSA-wrapped row per participant device per `key_version`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use hush_crypto::{
    base64_decode, base64_encode, import_public_pem, CryptoProvider, SymmetricKey,
};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::device::LocalDevice;
use crate::error::{Error, Result};
use crate::store::{ConversationKeyRow, ConversationKeyStore, KeyDirectory, StoreError};

// ============================================================================
// ConversationKey / KeyCache
// ============================================================================

#[derive(Clone, PartialEq, Eq)]
pub struct ConversationKey {
    key: SymmetricKey,
    version: u32,
}

impl ConversationKey {
    pub fn new(key: SymmetricKey, version: u32) -> Self {
        Self { key, version }
    }

    pub fn key(&self) -> &SymmetricKey {
        &self.key
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

impl std::fmt::Debug for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationKey")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Opportunistic in-memory cache of every key version this device holds,
/// per conversation. Cleared wholesale on lock; keys zeroize on drop.
#[derive(Default)]
pub struct KeyCache {
    entries: RwLock<HashMap<String, BTreeMap<u32, ConversationKey>>>,
}

impl KeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The newest cached version.
    pub fn get(&self, conversation_id: &str) -> Option<ConversationKey> {
        self.entries
            .read()
            .get(conversation_id)
            .and_then(|versions| versions.values().next_back().cloned())
    }

    /// Every cached version, newest first.
    pub fn versions(&self, conversation_id: &str) -> Vec<ConversationKey> {
        self.entries
            .read()
            .get(conversation_id)
            .map(|versions| versions.values().rev().cloned().collect())
            .unwrap_or_default()
    }

    pub fn insert(&self, conversation_id: &str, key: ConversationKey) {
        self.entries
            .write()
            .entry(conversation_id.to_string())
            .or_default()
            .insert(key.version(), key);
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Cached keys across all conversations and versions.
    pub fn len(&self) -> usize {
        self.entries.read().values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// ConversationKeyManager
// ============================================================================

/// Creation attempts before a uniqueness conflict is reported.
const CREATE_ATTEMPTS: usize = 2;

pub struct ConversationKeyManager {
    store: Arc<dyn ConversationKeyStore>,
    directory: Arc<dyn KeyDirectory>,
    provider: Arc<dyn CryptoProvider>,
    cache: Arc<KeyCache>,
}

impl ConversationKeyManager {
    pub fn new(
        store: Arc<dyn ConversationKeyStore>,
        directory: Arc<dyn KeyDirectory>,
        provider: Arc<dyn CryptoProvider>,
        cache: Arc<KeyCache>,
    ) -> Self {
        Self {
            store,
            directory,
            provider,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<KeyCache> {
        &self.cache
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    /// The newest key this device holds for the conversation, without
    /// creating one.
    pub async fn lookup(
        &self,
        conversation_id: &str,
        device: &LocalDevice,
    ) -> Result<Option<ConversationKey>> {
        Ok(self.held(conversation_id, device).await?.into_iter().next())
    }

    /// Every key version this device can unwrap, newest first. Served from
    /// the cache when it holds any version of the conversation.
    pub async fn held(
        &self,
        conversation_id: &str,
        device: &LocalDevice,
    ) -> Result<Vec<ConversationKey>> {
        let cached = self.cache.versions(conversation_id);
        if !cached.is_empty() {
            return Ok(cached);
        }
        self.refresh(conversation_id, device).await
    }

    /// Re-read every row this device holds, bypassing the cache. Used when
    /// cached keys no longer open messages because another device added a
    /// newer version.
    pub async fn refresh(
        &self,
        conversation_id: &str,
        device: &LocalDevice,
    ) -> Result<Vec<ConversationKey>> {
        let found = self.read_own(conversation_id, device).await?;
        for key in &found {
            self.cache.insert(conversation_id, key.clone());
        }
        Ok(found)
    }

    /// The key to send with: this device's copy of the conversation's newest
    /// version. A new version is created for every participant device when
    /// this device holds no usable copy of the newest one.
    pub async fn get_or_create(
        &self,
        conversation_id: &str,
        device: &LocalDevice,
    ) -> Result<ConversationKey> {
        let latest = self.store.max_version(conversation_id).await?;
        let mut current = self.lookup(conversation_id, device).await?;
        let cached_version = current.as_ref().map(ConversationKey::version);
        if let (Some(cached_version), Some(latest)) = (cached_version, latest) {
            if cached_version < latest {
                debug!(
                    conversation_id,
                    cached_version,
                    latest_version = latest,
                    "cached conversation key is stale; refreshing"
                );
                current = self
                    .refresh(conversation_id, device)
                    .await?
                    .into_iter()
                    .next();
            }
        }

        match current {
            Some(key) if latest.map_or(true, |latest| key.version() >= latest) => Ok(key),
            _ => self.create(conversation_id, device).await,
        }
    }

    /// Unwrap this device's rows, newest first. Rows that fail to unwrap are
    /// logged and skipped.
    async fn read_own(
        &self,
        conversation_id: &str,
        device: &LocalDevice,
    ) -> Result<Vec<ConversationKey>> {
        let rows = self
            .store
            .rows_for_device(conversation_id, device.user_id(), device.device_id())
            .await?;

        let mut keys = Vec::with_capacity(rows.len());
        for row in &rows {
            let unwrapped = base64_decode(&row.wrapped_key)
                .and_then(|wrapped| self.provider.unwrap_on_device(device.keys(), &wrapped));
            match unwrapped {
                Ok(key) => keys.push(ConversationKey::new(key, row.key_version)),
                Err(e) => warn!(
                    conversation_id,
                    device_id = device.device_id(),
                    key_version = row.key_version,
                    error = %e,
                    "conversation key mismatch for this device"
                ),
            }
        }
        Ok(keys)
    }

    async fn create(&self, conversation_id: &str, device: &LocalDevice) -> Result<ConversationKey> {
        let mut attempt = 1;
        loop {
            let key = self.provider.generate_symmetric_key()?;
            let version = self
                .store
                .max_version(conversation_id)
                .await?
                .map_or(1, |v| v + 1);

            let rows = self
                .wrap_for_participants(conversation_id, device, &key, version)
                .await?;

            match self.store.insert_batch(&rows).await {
                Ok(()) => {
                    info!(
                        conversation_id,
                        key_version = version,
                        devices = rows.len(),
                        "created conversation key"
                    );
                    let created = ConversationKey::new(key, version);
                    self.cache.insert(conversation_id, created.clone());
                    return Ok(created);
                }
                Err(StoreError::Conflict(detail)) => {
                    debug!(
                        conversation_id,
                        key_version = version,
                        attempt,
                        "concurrent conversation key creation; re-reading"
                    );
                    let winner = self
                        .refresh(conversation_id, device)
                        .await?
                        .into_iter()
                        .next()
                        .filter(|k| k.version() >= version);
                    if let Some(winner) = winner {
                        return Ok(winner);
                    }
                    if attempt >= CREATE_ATTEMPTS {
                        return Err(Error::Store(StoreError::Conflict(detail)));
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Wrap `key` for every device of every member. Any directory failure
    /// aborts before a single row exists.
    async fn wrap_for_participants(
        &self,
        conversation_id: &str,
        device: &LocalDevice,
        key: &SymmetricKey,
        version: u32,
    ) -> Result<Vec<ConversationKeyRow>> {
        let mut members = self.store.members(conversation_id).await?;
        if !members.iter().any(|m| m == device.user_id()) {
            members.push(device.user_id().to_string());
        }

        let created_at = Utc::now();
        let row = |user_id: &str, device_id: &str, wrapped: &[u8]| ConversationKeyRow {
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
            wrapped_key: base64_encode(wrapped),
            key_version: version,
            created_at,
        };

        let mut rows = Vec::new();
        let mut includes_self = false;
        for user_id in &members {
            let device_ids = self
                .directory
                .list_devices(user_id)
                .await
                .map_err(Error::Directory)?;

            for device_id in device_ids {
                if user_id == device.user_id() && device_id == device.device_id() {
                    let wrapped = self.provider.wrap_for_device(device.public_key(), &key[..])?;
                    rows.push(row(user_id.as_str(), device_id.as_str(), wrapped.as_slice()));
                    includes_self = true;
                    continue;
                }

                let pem = self
                    .directory
                    .lookup(user_id, &device_id)
                    .await
                    .map_err(Error::Directory)?;
                let Some(pem) = pem else {
                    warn!(user_id = %user_id, device_id = %device_id, "listed device has no public key");
                    continue;
                };
                let public_key = match import_public_pem(&pem) {
                    Ok(k) => k,
                    Err(e) => {
                        warn!(user_id = %user_id, device_id = %device_id, error = %e, "unusable device public key");
                        continue;
                    }
                };
                let wrapped = self.provider.wrap_for_device(&public_key, &key[..])?;
                rows.push(row(user_id.as_str(), device_id.as_str(), wrapped.as_slice()));
            }
        }

        if !includes_self {
            let wrapped = self.provider.wrap_for_device(device.public_key(), &key[..])?;
            rows.push(row(device.user_id(), device.device_id(), wrapped.as_slice()));
        }
        Ok(rows)
    }
}
