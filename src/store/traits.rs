use async_trait::async_trait;

use super::error::StoreError;
use super::types::{ConversationKeyRow, PinCredential, PinWrapPatch, StoredMessage};

// ============================================================================
// KeyDirectory
// ============================================================================

/// Server-side registry of device public keys.
///
/// Callers own retries; implementations report failures as-is.
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    async fn publish(
        &self,
        user_id: &str,
        device_id: &str,
        public_key: &str,
    ) -> Result<(), StoreError>;

    /// The SPKI PEM published for a device, if any.
    async fn lookup(&self, user_id: &str, device_id: &str) -> Result<Option<String>, StoreError>;

    async fn list_devices(&self, user_id: &str) -> Result<Vec<String>, StoreError>;
}

// ============================================================================
// ConversationKeyStore
// ============================================================================

#[async_trait]
pub trait ConversationKeyStore: Send + Sync {
    /// User ids participating in a conversation.
    async fn members(&self, conversation_id: &str) -> Result<Vec<String>, StoreError>;

    /// Rows held by one device, newest `key_version` first.
    async fn rows_for_device(
        &self,
        conversation_id: &str,
        user_id: &str,
        device_id: &str,
    ) -> Result<Vec<ConversationKeyRow>, StoreError>;

    async fn max_version(&self, conversation_id: &str) -> Result<Option<u32>, StoreError>;

    /// Insert all rows or none. A row whose
    /// `(conversation_id, user_id, device_id, key_version)` already exists
    /// fails the batch with [`StoreError::Conflict`].
    async fn insert_batch(&self, rows: &[ConversationKeyRow]) -> Result<(), StoreError>;
}

// ============================================================================
// PinCredentialStore
// ============================================================================

#[async_trait]
pub trait PinCredentialStore: Send + Sync {
    async fn upsert(&self, user_id: &str, credential: &PinCredential) -> Result<(), StoreError>;

    async fn get(&self, user_id: &str) -> Result<Option<PinCredential>, StoreError>;

    async fn delete(&self, user_id: &str) -> Result<(), StoreError>;
}

// ============================================================================
// MessageStore
// ============================================================================

/// The slice of the message table that migration needs.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn get(&self, message_id: &str) -> Result<Option<StoredMessage>, StoreError>;

    /// Apply a PIN-wrap patch. Unknown ids are [`StoreError::NotFound`].
    async fn patch_pin_wrap(&self, message_id: &str, patch: &PinWrapPatch)
        -> Result<(), StoreError>;
}
