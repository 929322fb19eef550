use std::sync::Arc;

use hush::{
    MemoryBackend, MemorySecureStorage, OutgoingMessage, SecureStorage, Session, SessionDeps,
    SessionOptions, StoredMessage,
};

// ============================================================================
// Helpers
// ============================================================================

/// PBKDF2 stays real; only the iteration count is lowered.
pub fn options() -> SessionOptions {
    SessionOptions {
        pbkdf2_iterations: 1_000,
        ..Default::default()
    }
}

/// A fresh installation (its own secure storage) of `user_id` against the
/// shared backend.
pub async fn open_device(backend: &Arc<MemoryBackend>, user_id: &str) -> Session {
    open_device_with(backend, user_id, options()).await
}

pub async fn open_device_with(
    backend: &Arc<MemoryBackend>,
    user_id: &str,
    options: SessionOptions,
) -> Session {
    let storage: Arc<dyn SecureStorage> = Arc::new(MemorySecureStorage::new());
    Session::open(
        user_id,
        options,
        SessionDeps::in_memory(Arc::clone(backend), storage),
    )
    .await
    .expect("open session")
}

/// Store an outgoing message the way the message table would.
pub fn persist(backend: &MemoryBackend, id: &str, outgoing: &OutgoingMessage) -> StoredMessage {
    let message = StoredMessage {
        id: id.to_string(),
        conversation_id: outgoing.conversation_id.clone(),
        content: outgoing.content.clone(),
        is_encrypted: outgoing.is_encrypted,
        sender_device_id: Some(outgoing.sender_device_id.clone()),
        encrypted_aes_key_by_pin: outgoing.encrypted_aes_key_by_pin.clone(),
    };
    backend.put_message(message.clone());
    message
}

pub fn segments(content: &str) -> usize {
    content.split(':').count()
}
