//! Message encryption and the ordered decrypt strategy list.

use std::sync::Arc;

use hush_crypto::{key_from_slice, CryptoError, CryptoProvider, RsaPublicKey, SymmetricKey};
use hush_envelope::{pin_unwrap_key, pin_wrap_key, Envelope, PinWrappedKey};
use tracing::debug;

use crate::device::LocalDevice;
use crate::error::{DecryptError, Result, UnavailableReason};
use crate::keys::ConversationKey;

/// One way of recovering an envelope's symmetric key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptStrategy {
    /// Unwrap segment 1 with this device's private key.
    LocalDevice,
    /// Unwrap the store's out-of-band PIN-wrapped key with the master key.
    PinFromStore,
    /// Unwrap segment 2 with the master key.
    PinInline,
    /// Use this device's copies of the conversation key, newest version first.
    ConversationKey,
}

/// Everything the strategies may draw on. Absent inputs disable the
/// strategies that need them.
#[derive(Clone, Copy)]
pub struct DecryptContext<'a> {
    pub device: &'a LocalDevice,
    pub sender_device_id: Option<&'a str>,
    pub pin_wrapped_from_store: Option<&'a str>,
    pub master_key: Option<&'a [u8]>,
    /// Conversation keys this device holds, newest version first.
    pub conversation_keys: &'a [ConversationKey],
}

pub struct Decrypted {
    pub plaintext: String,
    /// The recovered symmetric key, for re-wrapping during migration.
    pub key: SymmetricKey,
    pub strategy: DecryptStrategy,
}

impl std::fmt::Debug for Decrypted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decrypted")
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

pub struct MessageCipher {
    provider: Arc<dyn CryptoProvider>,
}

impl MessageCipher {
    pub fn new(provider: Arc<dyn CryptoProvider>) -> Self {
        Self { provider }
    }

    /// AES-256-GCM encrypt to base64 `IV ‖ ciphertext ‖ tag`.
    pub fn encrypt(&self, plaintext: &str, key: &[u8]) -> std::result::Result<String, CryptoError> {
        self.provider.encrypt_payload(key, plaintext.as_bytes())
    }

    pub fn decrypt(&self, payload: &str, key: &[u8]) -> std::result::Result<String, DecryptError> {
        let bytes = self.provider.decrypt_payload(key, payload)?;
        String::from_utf8(bytes).map_err(|_| DecryptError::InvalidUtf8)
    }

    /// Seal `plaintext` for the device holding `public_key`.
    ///
    /// Uses `symmetric_key` when given, otherwise a fresh per-message key. With
    /// a master key the envelope carries the PIN segment; without one it is
    /// the two-segment form.
    pub fn build_envelope(
        &self,
        plaintext: &str,
        public_key: &RsaPublicKey,
        master_key: Option<&[u8]>,
        symmetric_key: Option<&[u8]>,
    ) -> Result<Envelope> {
        let key = match symmetric_key {
            Some(k) => key_from_slice(k)?,
            None => self.provider.generate_symmetric_key()?,
        };
        let wrapped_key = self.provider.wrap_for_device(public_key, &key[..])?;
        let pin_wrapped = master_key
            .map(|master| pin_wrap_key(master, &key[..]))
            .transpose()?;
        let payload = self.encrypt(plaintext, &key[..])?;
        Ok(Envelope::from_payload(wrapped_key, pin_wrapped, payload))
    }

    pub fn parse_envelope(&self, input: &str) -> Option<Envelope> {
        hush_envelope::try_parse_envelope(input)
    }

    /// Strategies to try for `envelope`, in order.
    ///
    /// A message this device sent is only ever decrypted with the device key.
    /// A message with no recorded sender tries the device key last.
    pub fn plan(
        &self,
        envelope: &Envelope,
        ctx: &DecryptContext<'_>,
    ) -> std::result::Result<Vec<DecryptStrategy>, DecryptError> {
        if ctx.sender_device_id == Some(ctx.device.device_id()) {
            return Ok(vec![DecryptStrategy::LocalDevice]);
        }

        let mut plan = Vec::with_capacity(4);
        if ctx.master_key.is_some() {
            if ctx.pin_wrapped_from_store.is_some() {
                plan.push(DecryptStrategy::PinFromStore);
            }
            if envelope.pin_wrapped().is_some() {
                plan.push(DecryptStrategy::PinInline);
            }
        }
        if !ctx.conversation_keys.is_empty() {
            plan.push(DecryptStrategy::ConversationKey);
        }
        if ctx.sender_device_id.is_none() {
            plan.push(DecryptStrategy::LocalDevice);
        }

        if plan.is_empty() {
            let reason = if ctx.master_key.is_none() {
                UnavailableReason::Locked
            } else {
                UnavailableReason::NoPinWrappedKey
            };
            return Err(DecryptError::UnavailableKey(reason));
        }
        Ok(plan)
    }

    /// Run the strategy list; the first success wins.
    pub fn decrypt_envelope(
        &self,
        envelope: &Envelope,
        ctx: &DecryptContext<'_>,
    ) -> std::result::Result<Decrypted, DecryptError> {
        let plan = self.plan(envelope, ctx)?;
        let local_only = plan == [DecryptStrategy::LocalDevice];

        let mut last_error = None;
        for strategy in plan {
            match self.try_strategy(strategy, envelope, ctx) {
                Ok(decrypted) => {
                    debug!(?strategy, "message decrypted");
                    return Ok(decrypted);
                }
                Err(e) if local_only => return Err(e),
                Err(e) => {
                    debug!(?strategy, error = %e, "decrypt strategy failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(DecryptError::UnavailableKey(
            UnavailableReason::NoConversationKey,
        )))
    }

    fn try_strategy(
        &self,
        strategy: DecryptStrategy,
        envelope: &Envelope,
        ctx: &DecryptContext<'_>,
    ) -> std::result::Result<Decrypted, DecryptError> {
        let key = match strategy {
            DecryptStrategy::LocalDevice => self
                .provider
                .unwrap_on_device(ctx.device.keys(), envelope.wrapped_key())?,
            DecryptStrategy::PinFromStore => {
                let stored = ctx
                    .pin_wrapped_from_store
                    .ok_or(DecryptError::UnavailableKey(UnavailableReason::NoPinWrappedKey))?;
                let wrapped = PinWrappedKey::parse_stored(stored)?;
                self.pin_unwrap(&wrapped, ctx)?
            }
            DecryptStrategy::PinInline => {
                let wrapped = envelope
                    .pin_wrapped()
                    .ok_or(DecryptError::UnavailableKey(UnavailableReason::NoPinWrappedKey))?;
                self.pin_unwrap(wrapped, ctx)?
            }
            DecryptStrategy::ConversationKey => return self.try_conversation_keys(envelope, ctx),
        };

        let plaintext = self.decrypt(envelope.cipher_text(), &key[..])?;
        Ok(Decrypted {
            plaintext,
            key,
            strategy,
        })
    }

    /// The envelope does not name a key version, so each held version is
    /// tried in turn.
    fn try_conversation_keys(
        &self,
        envelope: &Envelope,
        ctx: &DecryptContext<'_>,
    ) -> std::result::Result<Decrypted, DecryptError> {
        let mut last_error = DecryptError::UnavailableKey(UnavailableReason::NoConversationKey);
        for candidate in ctx.conversation_keys {
            match self.decrypt(envelope.cipher_text(), &candidate.key()[..]) {
                Ok(plaintext) => {
                    return Ok(Decrypted {
                        plaintext,
                        key: candidate.key().clone(),
                        strategy: DecryptStrategy::ConversationKey,
                    })
                }
                Err(e) => {
                    debug!(key_version = candidate.version(), "conversation key did not open message");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    fn pin_unwrap(
        &self,
        wrapped: &PinWrappedKey,
        ctx: &DecryptContext<'_>,
    ) -> std::result::Result<SymmetricKey, DecryptError> {
        let master = ctx
            .master_key
            .ok_or(DecryptError::UnavailableKey(UnavailableReason::Locked))?;
        pin_unwrap_key(master, wrapped).map_err(DecryptError::from_unwrap)
    }
}
