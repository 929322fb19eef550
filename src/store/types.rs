use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One device's copy of a conversation key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationKeyRow {
    pub conversation_id: String,
    pub user_id: String,
    pub device_id: String,
    /// base64 RSA-wrapped 32-byte key.
    pub wrapped_key: String,
    pub key_version: u32,
    pub created_at: DateTime<Utc>,
}

/// Server-held PIN verifier. Both fields base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinCredential {
    pub salt: String,
    pub hash: String,
}

/// A message as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub content: String,
    pub is_encrypted: bool,
    #[serde(default)]
    pub sender_device_id: Option<String>,
    /// Out-of-band PIN-wrapped key, when that placement is used.
    #[serde(default)]
    pub encrypted_aes_key_by_pin: Option<String>,
}

/// Fields a migration may write. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinWrapPatch {
    pub content: Option<String>,
    pub encrypted_aes_key_by_pin: Option<String>,
}
