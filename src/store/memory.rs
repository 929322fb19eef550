//! In-memory implementation of every backend trait.
//!
//! Interior mutability via `parking_lot::Mutex`; no lock is held across an
//! await point.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::error::StoreError;
use super::traits::{ConversationKeyStore, KeyDirectory, MessageStore, PinCredentialStore};
use super::types::{ConversationKeyRow, PinCredential, PinWrapPatch, StoredMessage};

/// Unique key of a conversation key row.
type RowKey = (String, String, String, u32);

#[derive(Default)]
pub struct MemoryBackend {
    /// user id → (device id → public key PEM), sorted by device id
    devices: Mutex<HashMap<String, BTreeMap<String, String>>>,
    /// conversation id → member user ids
    members: Mutex<HashMap<String, Vec<String>>>,
    key_rows: Mutex<BTreeMap<RowKey, ConversationKeyRow>>,
    pin_credentials: Mutex<HashMap<String, PinCredential>>,
    messages: Mutex<HashMap<String, StoredMessage>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user to a conversation. Adding twice is a no-op.
    pub fn add_member(&self, conversation_id: &str, user_id: &str) {
        let mut members = self.members.lock();
        let list = members.entry(conversation_id.to_string()).or_default();
        if !list.iter().any(|u| u == user_id) {
            list.push(user_id.to_string());
        }
    }

    /// Store a message, replacing any with the same id.
    pub fn put_message(&self, message: StoredMessage) {
        self.messages.lock().insert(message.id.clone(), message);
    }

    pub fn message(&self, message_id: &str) -> Option<StoredMessage> {
        self.messages.lock().get(message_id).cloned()
    }

    /// Remove a device from the directory.
    pub fn remove_device(&self, user_id: &str, device_id: &str) {
        if let Some(devices) = self.devices.lock().get_mut(user_id) {
            devices.remove(device_id);
        }
    }

    /// Every conversation key row for a conversation, across all devices.
    pub fn key_rows(&self, conversation_id: &str) -> Vec<ConversationKeyRow> {
        self.key_rows
            .lock()
            .values()
            .filter(|r| r.conversation_id == conversation_id)
            .cloned()
            .collect()
    }
}

// ============================================================================
// KeyDirectory
// ============================================================================

#[async_trait]
impl KeyDirectory for MemoryBackend {
    async fn publish(
        &self,
        user_id: &str,
        device_id: &str,
        public_key: &str,
    ) -> Result<(), StoreError> {
        self.devices
            .lock()
            .entry(user_id.to_string())
            .or_default()
            .insert(device_id.to_string(), public_key.to_string());
        Ok(())
    }

    async fn lookup(&self, user_id: &str, device_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .devices
            .lock()
            .get(user_id)
            .and_then(|d| d.get(device_id))
            .cloned())
    }

    async fn list_devices(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .devices
            .lock()
            .get(user_id)
            .map(|d| d.keys().cloned().collect())
            .unwrap_or_default())
    }
}

// ============================================================================
// ConversationKeyStore
// ============================================================================

#[async_trait]
impl ConversationKeyStore for MemoryBackend {
    async fn members(&self, conversation_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .members
            .lock()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn rows_for_device(
        &self,
        conversation_id: &str,
        user_id: &str,
        device_id: &str,
    ) -> Result<Vec<ConversationKeyRow>, StoreError> {
        let mut rows: Vec<ConversationKeyRow> = self
            .key_rows
            .lock()
            .values()
            .filter(|r| {
                r.conversation_id == conversation_id
                    && r.user_id == user_id
                    && r.device_id == device_id
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.key_version.cmp(&a.key_version));
        Ok(rows)
    }

    async fn max_version(&self, conversation_id: &str) -> Result<Option<u32>, StoreError> {
        Ok(self
            .key_rows
            .lock()
            .values()
            .filter(|r| r.conversation_id == conversation_id)
            .map(|r| r.key_version)
            .max())
    }

    async fn insert_batch(&self, rows: &[ConversationKeyRow]) -> Result<(), StoreError> {
        let mut table = self.key_rows.lock();

        let mut seen = HashSet::new();
        for row in rows {
            let key = row_key(row);
            if table.contains_key(&key) || !seen.insert(key) {
                return Err(StoreError::Conflict(format!(
                    "conversation key {}/{}/{} v{}",
                    row.conversation_id, row.user_id, row.device_id, row.key_version
                )));
            }
        }

        for row in rows {
            table.insert(row_key(row), row.clone());
        }
        Ok(())
    }
}

fn row_key(row: &ConversationKeyRow) -> RowKey {
    (
        row.conversation_id.clone(),
        row.user_id.clone(),
        row.device_id.clone(),
        row.key_version,
    )
}

// ============================================================================
// PinCredentialStore
// ============================================================================

#[async_trait]
impl PinCredentialStore for MemoryBackend {
    async fn upsert(&self, user_id: &str, credential: &PinCredential) -> Result<(), StoreError> {
        self.pin_credentials
            .lock()
            .insert(user_id.to_string(), credential.clone());
        Ok(())
    }

    async fn get(&self, user_id: &str) -> Result<Option<PinCredential>, StoreError> {
        Ok(self.pin_credentials.lock().get(user_id).cloned())
    }

    async fn delete(&self, user_id: &str) -> Result<(), StoreError> {
        self.pin_credentials.lock().remove(user_id);
        Ok(())
    }
}

// ============================================================================
// MessageStore
// ============================================================================

#[async_trait]
impl MessageStore for MemoryBackend {
    async fn get(&self, message_id: &str) -> Result<Option<StoredMessage>, StoreError> {
        Ok(self.message(message_id))
    }

    async fn patch_pin_wrap(
        &self,
        message_id: &str,
        patch: &PinWrapPatch,
    ) -> Result<(), StoreError> {
        let mut messages = self.messages.lock();
        let message = messages
            .get_mut(message_id)
            .ok_or_else(|| StoreError::NotFound(format!("message {message_id}")))?;
        if let Some(content) = &patch.content {
            message.content = content.clone();
        }
        if let Some(pin) = &patch.encrypted_aes_key_by_pin {
            message.encrypted_aes_key_by_pin = Some(pin.clone());
        }
        Ok(())
    }
}
