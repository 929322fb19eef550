use std::sync::Arc;

use hush::{MemoryBackend, PinWrapPlacement, SessionOptions};

use crate::common::{open_device, open_device_with, options, persist, segments};

#[tokio::test]
async fn legacy_message_gains_pin_segment_once() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_member("c1", "alice");

    let d1 = open_device(&backend, "alice").await;
    let legacy = persist(&backend, "m1", &d1.encrypt_message("old news", "c1").await.unwrap());
    assert_eq!(segments(&legacy.content), 2);

    // Locked: nothing to migrate with.
    assert_eq!(d1.decrypt_message(&legacy).await.unwrap(), "old news");
    assert_eq!(backend.message("m1").unwrap(), legacy);

    d1.set_pin("424242").await.unwrap();
    assert_eq!(d1.decrypt_message(&legacy).await.unwrap(), "old news");

    let upgraded = backend.message("m1").unwrap();
    assert_eq!(segments(&upgraded.content), 3);
    let old: Vec<&str> = legacy.content.split(':').collect();
    let new: Vec<&str> = upgraded.content.split(':').collect();
    assert_eq!(new[0], old[0]);
    assert_eq!(new[2], old[1]);

    // Reading either copy again leaves the stored message alone.
    assert_eq!(d1.decrypt_message(&upgraded).await.unwrap(), "old news");
    assert_eq!(d1.decrypt_message(&legacy).await.unwrap(), "old news");
    assert_eq!(backend.message("m1").unwrap(), upgraded);

    let d2 = open_device(&backend, "alice").await;
    assert!(d2.decrypt_message(&upgraded).await.is_err());
    assert!(d2.unlock_with_pin("424242").await.success);
    assert_eq!(d2.decrypt_message(&upgraded).await.unwrap(), "old news");
}

#[tokio::test]
async fn column_placement_migrates_out_of_band() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_member("c1", "alice");
    let column = SessionOptions {
        pin_wrap_placement: PinWrapPlacement::Column,
        ..options()
    };

    let d1 = open_device_with(&backend, "alice", column.clone()).await;
    let legacy = persist(&backend, "m1", &d1.encrypt_message("side", "c1").await.unwrap());
    d1.set_pin("909090").await.unwrap();
    d1.decrypt_message(&legacy).await.unwrap();

    let upgraded = backend.message("m1").unwrap();
    assert_eq!(upgraded.content, legacy.content);
    assert!(upgraded.encrypted_aes_key_by_pin.is_some());

    let d2 = open_device_with(&backend, "alice", column).await;
    assert!(d2.unlock_with_pin("909090").await.success);
    assert_eq!(d2.decrypt_message(&upgraded).await.unwrap(), "side");
}

#[tokio::test]
async fn disabled_migration_never_writes() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_member("c1", "alice");
    let d1 = open_device_with(
        &backend,
        "alice",
        SessionOptions {
            migrate_legacy_envelopes: false,
            ..options()
        },
    )
    .await;

    let legacy = persist(&backend, "m1", &d1.encrypt_message("keep", "c1").await.unwrap());
    d1.set_pin("123123").await.unwrap();
    assert_eq!(d1.decrypt_message(&legacy).await.unwrap(), "keep");
    assert_eq!(backend.message("m1").unwrap(), legacy);
}

#[tokio::test]
async fn other_devices_never_migrate() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_member("c1", "alice");
    backend.add_member("c1", "bob");

    let alice = open_device(&backend, "alice").await;
    let bob = open_device(&backend, "bob").await;
    bob.set_pin("777777").await.unwrap();

    let legacy = persist(&backend, "m1", &alice.encrypt_message("hey", "c1").await.unwrap());
    assert_eq!(bob.decrypt_message(&legacy).await.unwrap(), "hey");
    assert_eq!(backend.message("m1").unwrap(), legacy);
}
