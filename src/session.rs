//! Per-login context object.
//!
//! A [`Session`] is created when a user logs in and closed when they log out.
//! It owns the device identity, the PIN vault, the conversation key cache and
//! the collaborators, and exposes the operations the message layer calls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hush_crypto::{CryptoProvider, SoftwareProvider};
use hush_envelope::parse_envelope;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cipher::{DecryptContext, DecryptStrategy, MessageCipher};
use crate::config::{PinWrapPlacement, SessionOptions};
use crate::device::DeviceIdentityManager;
use crate::error::{DecryptError, Error, Result, UnavailableReason};
use crate::keys::{ConversationKeyManager, KeyCache};
use crate::migration::MigrationAgent;
use crate::secure_storage::SecureStorage;
use crate::store::{
    ConversationKeyStore, KeyDirectory, MemoryBackend, MessageStore, PinCredentialStore,
    StoredMessage,
};
use crate::vault::PinVault;

/// Collaborators a session is built from.
#[derive(Clone)]
pub struct SessionDeps {
    pub directory: Arc<dyn KeyDirectory>,
    pub conversation_keys: Arc<dyn ConversationKeyStore>,
    pub pin_credentials: Arc<dyn PinCredentialStore>,
    pub messages: Arc<dyn MessageStore>,
    pub secure_storage: Arc<dyn SecureStorage>,
    pub provider: Arc<dyn CryptoProvider>,
}

impl SessionDeps {
    /// Every backend trait served by one [`MemoryBackend`], software crypto.
    pub fn in_memory(backend: Arc<MemoryBackend>, secure_storage: Arc<dyn SecureStorage>) -> Self {
        Self {
            directory: Arc::clone(&backend) as _,
            conversation_keys: Arc::clone(&backend) as _,
            pin_credentials: Arc::clone(&backend) as _,
            messages: backend,
            secure_storage,
            provider: Arc::new(SoftwareProvider),
        }
    }
}

/// What `encrypt_message` hands to the message store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub conversation_id: String,
    pub content: String,
    pub is_encrypted: bool,
    pub sender_device_id: String,
    pub encrypted_aes_key_by_pin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnlockOutcome {
    pub success: bool,
    pub error: Option<String>,
}

pub struct Session {
    user_id: String,
    options: SessionOptions,
    devices: DeviceIdentityManager,
    keys: ConversationKeyManager,
    vault: PinVault,
    cipher: MessageCipher,
    migration: MigrationAgent,
    closed: AtomicBool,
}

impl Session {
    /// Build a session without touching the device identity.
    pub fn new(user_id: &str, options: SessionOptions, deps: SessionDeps) -> Result<Self> {
        options.validate()?;
        let cache = Arc::new(KeyCache::new());

        Ok(Self {
            user_id: user_id.to_string(),
            devices: DeviceIdentityManager::new(
                deps.secure_storage,
                Arc::clone(&deps.directory),
                Arc::clone(&deps.provider),
            ),
            keys: ConversationKeyManager::new(
                deps.conversation_keys,
                deps.directory,
                Arc::clone(&deps.provider),
                Arc::clone(&cache),
            ),
            vault: PinVault::new(
                deps.pin_credentials,
                Arc::clone(&deps.provider),
                cache,
                options.pbkdf2_iterations,
            ),
            cipher: MessageCipher::new(deps.provider),
            migration: MigrationAgent::new(deps.messages, options.pin_wrap_placement),
            options,
            closed: AtomicBool::new(false),
        })
    }

    /// Build a session and load (or create and publish) the device identity.
    pub async fn open(user_id: &str, options: SessionOptions, deps: SessionDeps) -> Result<Self> {
        let session = Self::new(user_id, options, deps)?;
        let device = session.devices.ensure(user_id).await?;
        info!(user_id, device_id = device.device_id(), "session opened");
        Ok(session)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// This device's id, once the identity is loaded.
    pub fn device_id(&self) -> Option<String> {
        self.devices.current().map(|d| d.device_id().to_string())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::SessionClosed)
        } else {
            Ok(())
        }
    }

    // ------------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------------

    pub async fn encrypt_message(
        &self,
        plaintext: &str,
        conversation_id: &str,
    ) -> Result<OutgoingMessage> {
        self.ensure_open()?;
        let device = self.devices.ensure(&self.user_id).await?;

        let conversation_key = if self.options.use_conversation_key {
            Some(self.keys.get_or_create(conversation_id, &device).await?)
        } else {
            None
        };
        let master = self.vault.master_unlock_key();

        let envelope = self.cipher.build_envelope(
            plaintext,
            device.public_key(),
            master.as_ref().map(|k| &k[..]),
            conversation_key.as_ref().map(|k| &k.key()[..]),
        )?;

        let (content, encrypted_aes_key_by_pin) =
            match (self.options.pin_wrap_placement, envelope.pin_wrapped()) {
                (PinWrapPlacement::Column, Some(pin)) => (
                    envelope.without_pin_wrapped().to_wire(),
                    Some(pin.as_segment().to_string()),
                ),
                _ => (envelope.to_wire(), None),
            };

        debug!(
            conversation_id,
            segments = envelope.segment_count(),
            key_version = conversation_key.as_ref().map(|k| k.version()),
            "message encrypted"
        );
        Ok(OutgoingMessage {
            conversation_id: conversation_id.to_string(),
            content,
            is_encrypted: true,
            sender_device_id: device.device_id().to_string(),
            encrypted_aes_key_by_pin,
        })
    }

    /// Recover a stored message's plaintext.
    ///
    /// Unencrypted messages come back as-is. Every failure is a
    /// [`DecryptError`]; ciphertext is never returned as plaintext.
    pub async fn decrypt_message(
        &self,
        message: &StoredMessage,
    ) -> std::result::Result<String, DecryptError> {
        if self.is_closed() {
            return Err(DecryptError::UnavailableKey(UnavailableReason::SessionClosed));
        }
        if !message.is_encrypted {
            return Ok(message.content.clone());
        }

        let envelope = parse_envelope(&message.content)?;
        let device = self.devices.ensure(&self.user_id).await.map_err(|e| {
            warn!(message_id = %message.id, error = %e, "no device identity for decrypt");
            DecryptError::UnavailableKey(UnavailableReason::NoIdentity)
        })?;

        let sent_here = message.sender_device_id.as_deref() == Some(device.device_id());
        let use_conversation_keys = self.options.use_conversation_key && !sent_here;
        let conversation_keys = if use_conversation_keys {
            self.keys
                .held(&message.conversation_id, &device)
                .await
                .unwrap_or_else(|e| {
                    warn!(
                        conversation_id = %message.conversation_id,
                        error = %e,
                        "conversation key lookup failed"
                    );
                    Vec::new()
                })
        } else {
            Vec::new()
        };
        let master = self.vault.master_unlock_key();

        let refreshed;
        let mut ctx = DecryptContext {
            device: &device,
            sender_device_id: message.sender_device_id.as_deref(),
            pin_wrapped_from_store: message.encrypted_aes_key_by_pin.as_deref(),
            master_key: master.as_ref().map(|k| &k[..]),
            conversation_keys: &conversation_keys,
        };
        let decrypted = match self.cipher.decrypt_envelope(&envelope, &ctx) {
            Ok(decrypted) => decrypted,
            Err(first) => {
                // Cached keys may predate the version the sender used.
                refreshed = if use_conversation_keys {
                    self.keys
                        .refresh(&message.conversation_id, &device)
                        .await
                        .unwrap_or_default()
                } else {
                    Vec::new()
                };
                let learned_new_version = refreshed
                    .iter()
                    .any(|k| conversation_keys.iter().all(|c| c.version() != k.version()));
                if !learned_new_version {
                    debug!(message_id = %message.id, error = %first, "message not decryptable");
                    return Err(first);
                }
                ctx.conversation_keys = &refreshed;
                self.cipher.decrypt_envelope(&envelope, &ctx).map_err(|e| {
                    debug!(message_id = %message.id, error = %e, "message not decryptable");
                    e
                })?
            }
        };

        if self.options.migrate_legacy_envelopes
            && decrypted.strategy == DecryptStrategy::LocalDevice
            && envelope.is_legacy()
        {
            let outcome = self
                .migration
                .maybe_upgrade(message, &envelope, &decrypted, ctx.master_key)
                .await;
            debug!(message_id = %message.id, ?outcome, "legacy envelope check");
        }

        Ok(decrypted.plaintext)
    }

    // ------------------------------------------------------------------------
    // PIN
    // ------------------------------------------------------------------------

    pub async fn set_pin(&self, pin: &str) -> Result<()> {
        self.ensure_open()?;
        self.vault.set_pin(pin, &self.user_id).await
    }

    pub async fn unlock_with_pin(&self, pin: &str) -> UnlockOutcome {
        let result = match self.ensure_open() {
            Ok(()) => self.vault.unlock_with_pin(pin, &self.user_id).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => UnlockOutcome {
                success: true,
                error: None,
            },
            Err(e) => UnlockOutcome {
                success: false,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn lock(&self) {
        self.vault.lock();
    }

    pub fn is_unlocked(&self) -> bool {
        self.vault.is_unlocked()
    }

    pub async fn has_pin(&self) -> Result<bool> {
        self.vault.has_pin(&self.user_id).await
    }

    pub async fn remove_pin(&self) -> Result<()> {
        self.ensure_open()?;
        self.vault.remove_pin(&self.user_id).await
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Replace this device's identity. Returns the new device id.
    ///
    /// Messages sealed for the old device id become unreadable here unless
    /// they carry a PIN-wrapped key.
    pub async fn force_re_register(&self) -> Result<String> {
        self.ensure_open()?;
        let device = self.devices.force_re_register(&self.user_id).await?;
        self.keys.clear();
        Ok(device.device_id().to_string())
    }

    /// Lock the vault and refuse further work. Idempotent.
    pub fn close(&self) {
        self.vault.lock();
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(user_id = %self.user_id, "session closed");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.vault.lock();
    }
}
