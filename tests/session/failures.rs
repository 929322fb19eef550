use std::sync::Arc;

use async_trait::async_trait;
use hush::crypto::{base64_decode, base64_encode};
use hush::{
    DecryptError, Error, KeyDirectory, MemoryBackend, MemorySecureStorage, SecureStorageError,
    Session, SessionDeps, StoreError, StoredMessage,
};

use crate::common::{open_device, options, persist};

/// Directory that accepts publishes but cannot list devices.
struct ListingDown(Arc<MemoryBackend>);

#[async_trait]
impl KeyDirectory for ListingDown {
    async fn publish(&self, user_id: &str, device_id: &str, public_key: &str) -> Result<(), StoreError> {
        self.0.publish(user_id, device_id, public_key).await
    }

    async fn lookup(&self, user_id: &str, device_id: &str) -> Result<Option<String>, StoreError> {
        self.0.lookup(user_id, device_id).await
    }

    async fn list_devices(&self, _user_id: &str) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Unavailable("directory timeout".to_string()))
    }
}

#[tokio::test]
async fn directory_failure_aborts_send_without_rows() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_member("c1", "alice");

    let mut deps =
        SessionDeps::in_memory(Arc::clone(&backend), Arc::new(MemorySecureStorage::new()));
    deps.directory = Arc::new(ListingDown(Arc::clone(&backend)));
    let session = Session::open("alice", options(), deps).await.unwrap();

    let err = session.encrypt_message("hello", "c1").await.unwrap_err();
    assert!(matches!(err, Error::Directory(StoreError::Unavailable(_))));
    assert!(backend.key_rows("c1").is_empty());
}

#[tokio::test]
async fn no_secure_storage_no_session() {
    let backend = Arc::new(MemoryBackend::new());
    let deps = SessionDeps::in_memory(
        Arc::clone(&backend),
        Arc::new(MemorySecureStorage::unavailable()),
    );
    let err = Session::open("alice", options(), deps).await.err().unwrap();
    assert!(matches!(
        err,
        Error::SecureStorage(SecureStorageError::Unavailable)
    ));
    assert!(backend.list_devices("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_content_is_a_format_error() {
    let backend = Arc::new(MemoryBackend::new());
    let session = open_device(&backend, "alice").await;

    for content in ["abc", "a:b:c:d", "not_base64!!:x", "", ":"] {
        let message = StoredMessage {
            id: "m1".to_string(),
            conversation_id: "c1".to_string(),
            content: content.to_string(),
            is_encrypted: true,
            sender_device_id: session.device_id(),
            encrypted_aes_key_by_pin: None,
        };
        assert!(
            matches!(
                session.decrypt_message(&message).await,
                Err(DecryptError::Format(_))
            ),
            "accepted {content:?}"
        );
    }
}

#[tokio::test]
async fn tampered_ciphertext_fails_authentication() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_member("c1", "alice");
    let session = open_device(&backend, "alice").await;
    let mut message = persist(
        &backend,
        "m1",
        &session.encrypt_message("hello", "c1").await.unwrap(),
    );

    let (wrapped, cipher) = message.content.split_once(':').unwrap();
    let mut bytes = base64_decode(cipher).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    message.content = format!("{wrapped}:{}", base64_encode(&bytes));

    assert!(matches!(
        session.decrypt_message(&message).await,
        Err(DecryptError::Authentication(_))
    ));
}

#[tokio::test]
async fn removed_device_keeps_existing_conversation_key() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_member("c1", "alice");
    backend.add_member("c1", "bob");

    let alice = open_device(&backend, "alice").await;
    let bob = open_device(&backend, "bob").await;
    let first = persist(&backend, "m1", &alice.encrypt_message("one", "c1").await.unwrap());
    assert_eq!(bob.decrypt_message(&first).await.unwrap(), "one");

    // Removing a device does not rotate the key it already holds.
    backend.remove_device("bob", &bob.device_id().unwrap());
    let second = persist(&backend, "m2", &alice.encrypt_message("two", "c1").await.unwrap());
    assert_eq!(bob.decrypt_message(&second).await.unwrap(), "two");
}

#[cfg(feature = "sqlite")]
async fn open_with_sqlite(backend: &Arc<MemoryBackend>, path: &std::path::Path) -> Session {
    let storage: Arc<dyn hush::SecureStorage> =
        Arc::new(hush::SqliteSecureStorage::open(path).unwrap());
    Session::open(
        "alice",
        options(),
        SessionDeps::in_memory(Arc::clone(backend), storage),
    )
    .await
    .unwrap()
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn sqlite_identity_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("device.db");
    let backend = Arc::new(MemoryBackend::new());

    let first = open_with_sqlite(&backend, &path).await.device_id();
    let second = open_with_sqlite(&backend, &path).await.device_id();
    assert!(first.is_some());
    assert_eq!(first, second);
    assert_eq!(backend.list_devices("alice").await.unwrap().len(), 1);
}
