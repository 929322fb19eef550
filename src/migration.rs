//! Legacy envelope migration.
//!
//! A two-segment envelope this device can open with its own key gets a
//! PIN-wrapped copy of its symmetric key, so the user's other devices can read
//! it after unlocking. Best-effort: failures are logged and otherwise ignored.
//! The ciphertext and the device-wrapped key are never rewritten.

use std::sync::Arc;

use hush_crypto::SymmetricKey;
use hush_envelope::{parse_envelope, pin_wrap_key, Envelope};
use tracing::{debug, info, warn};

use crate::cipher::{DecryptStrategy, Decrypted};
use crate::config::PinWrapPlacement;
use crate::error::Result;
use crate::store::{MessageStore, PinWrapPatch, StoreError, StoredMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    Upgraded(PinWrapPlacement),
    Skipped(SkipReason),
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Only a device-key decrypt proves this device may re-wrap the key.
    NotLocalDevice,
    AlreadyMigrated,
    Locked,
}

pub struct MigrationAgent {
    messages: Arc<dyn MessageStore>,
    placement: PinWrapPlacement,
}

impl MigrationAgent {
    pub fn new(messages: Arc<dyn MessageStore>, placement: PinWrapPlacement) -> Self {
        Self {
            messages,
            placement,
        }
    }

    /// Upgrade `message` if it is a legacy envelope just opened with the
    /// device key while the vault is unlocked.
    pub async fn maybe_upgrade(
        &self,
        message: &StoredMessage,
        envelope: &Envelope,
        decrypted: &Decrypted,
        master_key: Option<&[u8]>,
    ) -> MigrationOutcome {
        if decrypted.strategy != DecryptStrategy::LocalDevice {
            return MigrationOutcome::Skipped(SkipReason::NotLocalDevice);
        }
        if !envelope.is_legacy() || message.encrypted_aes_key_by_pin.is_some() {
            return MigrationOutcome::Skipped(SkipReason::AlreadyMigrated);
        }
        let Some(master_key) = master_key else {
            return MigrationOutcome::Skipped(SkipReason::Locked);
        };

        match self.upgrade(&message.id, master_key, &decrypted.key).await {
            Ok(true) => MigrationOutcome::Upgraded(self.placement),
            Ok(false) => MigrationOutcome::Skipped(SkipReason::AlreadyMigrated),
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "legacy envelope migration failed");
                MigrationOutcome::Failed
            }
        }
    }

    async fn upgrade(&self, message_id: &str, master_key: &[u8], key: &SymmetricKey) -> Result<bool> {
        // Re-read: another device or call may have upgraded it already.
        let current = self
            .messages
            .get(message_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("message {message_id}")))?;
        if current.encrypted_aes_key_by_pin.is_some() {
            debug!(message_id, "message already has an out-of-band PIN key");
            return Ok(false);
        }
        let envelope = parse_envelope(&current.content)?;
        if !envelope.is_legacy() {
            debug!(message_id, "message already has a PIN segment");
            return Ok(false);
        }

        let pin_wrapped = pin_wrap_key(master_key, &key[..])?;
        let patch = match self.placement {
            PinWrapPlacement::Inline => PinWrapPatch {
                content: Some(envelope.with_pin_wrapped(pin_wrapped).to_wire()),
                ..Default::default()
            },
            PinWrapPlacement::Column => PinWrapPatch {
                encrypted_aes_key_by_pin: Some(pin_wrapped.as_segment().to_string()),
                ..Default::default()
            },
        };
        self.messages.patch_pin_wrap(message_id, &patch).await?;
        info!(message_id, placement = ?self.placement, "migrated legacy envelope");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{DecryptContext, MessageCipher};
    use crate::device::{DeviceIdentityManager, LocalDevice};
    use crate::secure_storage::MemorySecureStorage;
    use crate::store::MemoryBackend;
    use hush_crypto::{generate_key, SoftwareProvider};

    struct Fixture {
        backend: Arc<MemoryBackend>,
        cipher: MessageCipher,
        device: Arc<LocalDevice>,
        master: SymmetricKey,
    }

    impl Fixture {
        async fn new() -> Self {
            let backend = Arc::new(MemoryBackend::new());
            let device = DeviceIdentityManager::new(
                Arc::new(MemorySecureStorage::new()),
                Arc::clone(&backend) as _,
                Arc::new(SoftwareProvider),
            )
            .ensure("alice")
            .await
            .unwrap();
            Self {
                backend,
                cipher: MessageCipher::new(Arc::new(SoftwareProvider)),
                device,
                master: generate_key().unwrap(),
            }
        }

        fn store_legacy(&self, id: &str, text: &str) -> StoredMessage {
            let envelope = self
                .cipher
                .build_envelope(text, self.device.public_key(), None, None)
                .unwrap();
            let message = StoredMessage {
                id: id.to_string(),
                conversation_id: "c1".to_string(),
                content: envelope.to_wire(),
                is_encrypted: true,
                sender_device_id: Some(self.device.device_id().to_string()),
                encrypted_aes_key_by_pin: None,
            };
            self.backend.put_message(message.clone());
            message
        }

        fn open(&self, message: &StoredMessage) -> (Envelope, Decrypted) {
            let envelope = parse_envelope(&message.content).unwrap();
            let ctx = DecryptContext {
                device: &self.device,
                sender_device_id: message.sender_device_id.as_deref(),
                pin_wrapped_from_store: message.encrypted_aes_key_by_pin.as_deref(),
                master_key: None,
                conversation_keys: &[],
            };
            let decrypted = self.cipher.decrypt_envelope(&envelope, &ctx).unwrap();
            (envelope, decrypted)
        }

        fn agent(&self, placement: PinWrapPlacement) -> MigrationAgent {
            MigrationAgent::new(Arc::clone(&self.backend) as _, placement)
        }
    }

    #[tokio::test]
    async fn inline_upgrade_adds_segment_once() {
        let fx = Fixture::new().await;
        let original = fx.store_legacy("m1", "hello");
        let (envelope, decrypted) = fx.open(&original);
        let agent = fx.agent(PinWrapPlacement::Inline);

        let outcome = agent
            .maybe_upgrade(&original, &envelope, &decrypted, Some(&fx.master[..]))
            .await;
        assert_eq!(outcome, MigrationOutcome::Upgraded(PinWrapPlacement::Inline));

        let upgraded = fx.backend.message("m1").unwrap();
        let parts: Vec<&str> = upgraded.content.split(':').collect();
        let old_parts: Vec<&str> = original.content.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], old_parts[0]);
        assert_eq!(parts[2], old_parts[1]);

        // A stale copy of the message does not trigger a second rewrite.
        let outcome = agent
            .maybe_upgrade(&original, &envelope, &decrypted, Some(&fx.master[..]))
            .await;
        assert_eq!(outcome, MigrationOutcome::Skipped(SkipReason::AlreadyMigrated));
        assert_eq!(fx.backend.message("m1").unwrap(), upgraded);

        // The new segment opens with the master key.
        let reparsed = parse_envelope(&upgraded.content).unwrap();
        let key =
            hush_envelope::pin_unwrap_key(&fx.master[..], reparsed.pin_wrapped().unwrap()).unwrap();
        assert_eq!(key, decrypted.key);
    }

    #[tokio::test]
    async fn column_upgrade_leaves_content_alone() {
        let fx = Fixture::new().await;
        let original = fx.store_legacy("m1", "hello");
        let (envelope, decrypted) = fx.open(&original);

        let outcome = fx
            .agent(PinWrapPlacement::Column)
            .maybe_upgrade(&original, &envelope, &decrypted, Some(&fx.master[..]))
            .await;
        assert_eq!(outcome, MigrationOutcome::Upgraded(PinWrapPlacement::Column));

        let upgraded = fx.backend.message("m1").unwrap();
        assert_eq!(upgraded.content, original.content);
        assert!(upgraded.encrypted_aes_key_by_pin.is_some());
    }

    #[tokio::test]
    async fn locked_vault_skips() {
        let fx = Fixture::new().await;
        let original = fx.store_legacy("m1", "hello");
        let (envelope, decrypted) = fx.open(&original);

        let outcome = fx
            .agent(PinWrapPlacement::Inline)
            .maybe_upgrade(&original, &envelope, &decrypted, None)
            .await;
        assert_eq!(outcome, MigrationOutcome::Skipped(SkipReason::Locked));
        assert_eq!(fx.backend.message("m1").unwrap(), original);
    }

    #[tokio::test]
    async fn store_failure_is_swallowed() {
        let fx = Fixture::new().await;
        let original = fx.store_legacy("m1", "hello");
        let (envelope, decrypted) = fx.open(&original);

        let mut missing = original.clone();
        missing.id = "gone".to_string();
        let outcome = fx
            .agent(PinWrapPlacement::Inline)
            .maybe_upgrade(&missing, &envelope, &decrypted, Some(&fx.master[..]))
            .await;
        assert_eq!(outcome, MigrationOutcome::Failed);
    }

    #[tokio::test]
    async fn pin_decrypts_are_not_migrated() {
        let fx = Fixture::new().await;
        let original = fx.store_legacy("m1", "hello");
        let (envelope, mut decrypted) = fx.open(&original);
        decrypted.strategy = DecryptStrategy::PinFromStore;

        let outcome = fx
            .agent(PinWrapPlacement::Inline)
            .maybe_upgrade(&original, &envelope, &decrypted, Some(&fx.master[..]))
            .await;
        assert_eq!(outcome, MigrationOutcome::Skipped(SkipReason::NotLocalDevice));
    }
}
