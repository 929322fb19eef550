//! Session configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Where the PIN-wrapped key of a new or migrated message is stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PinWrapPlacement {
    /// Third envelope segment inside `content`.
    #[default]
    Inline,
    /// The message's `encryptedAesKeyByPin` column; `content` stays two-segment.
    Column,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionOptions {
    /// PBKDF2-HMAC-SHA256 iteration count for the master unlock key. Every
    /// device of a user must agree on this.
    pub pbkdf2_iterations: u32,
    pub pin_wrap_placement: PinWrapPlacement,
    /// Add a PIN-wrapped key to legacy envelopes this device can decrypt.
    pub migrate_legacy_envelopes: bool,
    /// Encrypt outgoing messages under the conversation key instead of a
    /// fresh per-message key.
    pub use_conversation_key: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: hush_crypto::PBKDF2_ITERATIONS,
            pin_wrap_placement: PinWrapPlacement::Inline,
            migrate_legacy_envelopes: true,
            use_conversation_key: true,
        }
    }
}

impl SessionOptions {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pbkdf2_iterations == 0 {
            return Err(Error::Config(
                "pbkdf2Iterations must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
