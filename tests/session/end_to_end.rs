use std::sync::Arc;

use hush::{
    ConversationKeyStore, DecryptError, MemoryBackend, MemorySecureStorage, SecureStorage,
    Session, SessionDeps, UnavailableReason,
};

use crate::common::{open_device, options, persist, segments};

#[tokio::test]
async fn second_device_reads_after_pin_unlock() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_member("c1", "alice");

    let d1 = open_device(&backend, "alice").await;
    d1.set_pin("123456").await.unwrap();
    assert!(d1.is_unlocked());

    let outgoing = d1.encrypt_message("hello", "c1").await.unwrap();
    assert_eq!(segments(&outgoing.content), 3);
    let message = persist(&backend, "m1", &outgoing);

    let d2 = open_device(&backend, "alice").await;
    assert_ne!(d1.device_id(), d2.device_id());
    assert!(matches!(
        d2.decrypt_message(&message).await,
        Err(DecryptError::UnavailableKey(UnavailableReason::Locked))
    ));

    let outcome = d2.unlock_with_pin("123456").await;
    assert!(outcome.success);
    assert!(outcome.error.is_none());
    assert_eq!(d2.decrypt_message(&message).await.unwrap(), "hello");

    // The sender keeps reading its own message with the device key.
    assert_eq!(d1.decrypt_message(&message).await.unwrap(), "hello");
}

#[tokio::test]
async fn lock_purges_master_key_and_cache() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_member("c1", "alice");

    let d1 = open_device(&backend, "alice").await;
    d1.set_pin("123456").await.unwrap();
    let message = persist(&backend, "m1", &d1.encrypt_message("hello", "c1").await.unwrap());

    let d2 = open_device(&backend, "alice").await;
    assert!(d2.unlock_with_pin("123456").await.success);
    assert_eq!(d2.decrypt_message(&message).await.unwrap(), "hello");

    d2.lock();
    assert!(!d2.is_unlocked());
    assert!(d2.decrypt_message(&message).await.is_err());

    // Locking the sender does not affect device-key reads.
    d1.lock();
    assert_eq!(d1.decrypt_message(&message).await.unwrap(), "hello");
}

#[tokio::test]
async fn wrong_pin_changes_nothing() {
    let backend = Arc::new(MemoryBackend::new());
    let d1 = open_device(&backend, "alice").await;
    d1.set_pin("123456").await.unwrap();

    let d2 = open_device(&backend, "alice").await;
    let outcome = d2.unlock_with_pin("654321").await;
    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("Wrong PIN"));
    assert!(!d2.is_unlocked());

    assert!(d2.unlock_with_pin("123456").await.success);
    assert!(!d2.unlock_with_pin("000000").await.success);
    assert!(d2.is_unlocked());
}

#[tokio::test]
async fn other_participant_reads_with_conversation_key() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_member("c1", "alice");
    backend.add_member("c1", "bob");

    let alice = open_device(&backend, "alice").await;
    let bob = open_device(&backend, "bob").await;

    let message = persist(&backend, "m1", &alice.encrypt_message("hi bob", "c1").await.unwrap());
    assert_eq!(segments(&message.content), 2);
    assert!(!bob.is_unlocked());
    assert_eq!(bob.decrypt_message(&message).await.unwrap(), "hi bob");

    let reply = persist(&backend, "m2", &bob.encrypt_message("hi alice", "c1").await.unwrap());
    assert_eq!(alice.decrypt_message(&reply).await.unwrap(), "hi alice");
    assert_eq!(backend.key_rows("c1").len(), 2);
}

#[tokio::test]
async fn late_joiner_gets_new_version_and_sender_catches_up() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_member("c1", "alice");
    backend.add_member("c1", "bob");

    let alice = open_device(&backend, "alice").await;
    let early = persist(&backend, "m1", &alice.encrypt_message("before", "c1").await.unwrap());

    let bob = open_device(&backend, "bob").await;
    assert!(bob.decrypt_message(&early).await.is_err());

    let reply = persist(&backend, "m2", &bob.encrypt_message("joined", "c1").await.unwrap());
    assert_eq!(
        ConversationKeyStore::max_version(&*backend, "c1").await.unwrap(),
        Some(2)
    );

    // Alice's cached version 1 fails, the newer row is read and cached.
    assert_eq!(alice.decrypt_message(&reply).await.unwrap(), "joined");

    let later = persist(&backend, "m3", &alice.encrypt_message("welcome", "c1").await.unwrap());
    assert_eq!(bob.decrypt_message(&later).await.unwrap(), "welcome");
}

#[tokio::test]
async fn re_registered_device_relies_on_pin_for_old_messages() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_member("c1", "alice");

    let device = open_device(&backend, "alice").await;
    device.set_pin("112233").await.unwrap();
    let message = persist(&backend, "m1", &device.encrypt_message("old", "c1").await.unwrap());

    let old_id = device.device_id().unwrap();
    let new_id = device.force_re_register().await.unwrap();
    assert_ne!(old_id, new_id);

    assert_eq!(device.decrypt_message(&message).await.unwrap(), "old");

    device.lock();
    assert!(device.decrypt_message(&message).await.is_err());
}

#[tokio::test]
async fn existing_participant_keeps_history_after_new_version() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_member("c1", "alice");
    backend.add_member("c1", "bob");

    let installation: Arc<dyn SecureStorage> = Arc::new(MemorySecureStorage::new());
    let deps = SessionDeps::in_memory(Arc::clone(&backend), Arc::clone(&installation));
    let alice = Session::open("alice", options(), deps.clone()).await.unwrap();
    let bob = open_device(&backend, "bob").await;
    let history = persist(&backend, "m1", &bob.encrypt_message("v1 history", "c1").await.unwrap());
    assert_eq!(alice.decrypt_message(&history).await.unwrap(), "v1 history");

    // A second alice device has no version 1 row and creates version 2.
    let alice2 = open_device(&backend, "alice").await;
    let newer = persist(&backend, "m2", &alice2.encrypt_message("v2", "c1").await.unwrap());
    assert_eq!(
        ConversationKeyStore::max_version(&*backend, "c1").await.unwrap(),
        Some(2)
    );
    assert!(alice2.decrypt_message(&history).await.is_err());

    // Locking drops the cache; both versions are read back from the store.
    alice.lock();
    assert_eq!(alice.decrypt_message(&history).await.unwrap(), "v1 history");
    assert_eq!(alice.decrypt_message(&newer).await.unwrap(), "v2");

    // A restart of the same installation starts with an empty cache.
    alice.close();
    let restarted = Session::open("alice", options(), deps).await.unwrap();
    assert_eq!(restarted.device_id(), alice.device_id());
    assert_eq!(restarted.decrypt_message(&history).await.unwrap(), "v1 history");
}

#[tokio::test]
async fn sender_with_cached_key_sends_under_newest_version() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_member("c1", "alice");
    backend.add_member("c1", "bob");

    let bob = open_device(&backend, "bob").await;
    persist(&backend, "m1", &bob.encrypt_message("before", "c1").await.unwrap());

    let alice = open_device(&backend, "alice").await;
    persist(&backend, "m2", &alice.encrypt_message("joined", "c1").await.unwrap());

    // Bob has never failed a decrypt, yet moves to version 2 for sending.
    let after = persist(&backend, "m3", &bob.encrypt_message("after join", "c1").await.unwrap());
    assert_eq!(alice.decrypt_message(&after).await.unwrap(), "after join");
    assert_eq!(
        ConversationKeyStore::max_version(&*backend, "c1").await.unwrap(),
        Some(2)
    );
}
