//! Envelope parse/format.
//!
//! Wire format:
//! `base64(wrappedKey) [":" pinSegment] ":" base64(IV ‖ ciphertext ‖ tag)`
//!
//! Parsing is strict: exactly 2 or 3 non-empty segments, each valid base64,
//! with a ciphertext long enough to hold an IV and tag. Original segment text
//! is preserved so re-serializing never rewrites the ciphertext.

use hush_crypto::{base64_decode, base64_encode, AES_GCM_IV_LENGTH, AES_GCM_TAG_LENGTH};

use crate::error::EnvelopeError;
use crate::pin_segment::PinWrappedKey;

/// Segment separator.
pub const SEGMENT_SEPARATOR: char = ':';

/// A parsed message envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    wrapped_key: Vec<u8>,
    wrapped_key_segment: String,
    pin_wrapped: Option<PinWrappedKey>,
    cipher_text_segment: String,
}

impl Envelope {
    /// Assemble an envelope from its parts.
    pub fn new(wrapped_key: Vec<u8>, pin_wrapped: Option<PinWrappedKey>, cipher_text: &[u8]) -> Self {
        Self {
            wrapped_key_segment: base64_encode(&wrapped_key),
            wrapped_key,
            pin_wrapped,
            cipher_text_segment: base64_encode(cipher_text),
        }
    }

    /// Assemble an envelope around an already base64-encoded payload.
    pub fn from_payload(
        wrapped_key: Vec<u8>,
        pin_wrapped: Option<PinWrappedKey>,
        payload: String,
    ) -> Self {
        Self {
            wrapped_key_segment: base64_encode(&wrapped_key),
            wrapped_key,
            pin_wrapped,
            cipher_text_segment: payload,
        }
    }

    /// The device-wrapped key bytes (segment 1).
    pub fn wrapped_key(&self) -> &[u8] {
        &self.wrapped_key
    }

    /// The PIN-wrapped key (segment 2), if present.
    pub fn pin_wrapped(&self) -> Option<&PinWrappedKey> {
        self.pin_wrapped.as_ref()
    }

    /// The ciphertext segment, still base64.
    pub fn cipher_text(&self) -> &str {
        &self.cipher_text_segment
    }

    /// Two-segment envelopes predate the PIN layer.
    pub fn is_legacy(&self) -> bool {
        self.pin_wrapped.is_none()
    }

    pub fn segment_count(&self) -> usize {
        if self.is_legacy() {
            2
        } else {
            3
        }
    }

    /// Return a copy with the PIN segment added. An envelope that already has
    /// one is returned unchanged.
    pub fn with_pin_wrapped(&self, pin_wrapped: PinWrappedKey) -> Self {
        if !self.is_legacy() {
            return self.clone();
        }
        Self {
            pin_wrapped: Some(pin_wrapped),
            ..self.clone()
        }
    }

    /// Return a copy in the two-segment form, used when the PIN-wrapped key
    /// travels out of band.
    pub fn without_pin_wrapped(&self) -> Self {
        Self {
            pin_wrapped: None,
            ..self.clone()
        }
    }

    /// Serialize to the wire string.
    pub fn to_wire(&self) -> String {
        match &self.pin_wrapped {
            Some(pin) => format!(
                "{}{sep}{}{sep}{}",
                self.wrapped_key_segment,
                pin.as_segment(),
                self.cipher_text_segment,
                sep = SEGMENT_SEPARATOR
            ),
            None => format!(
                "{}{sep}{}",
                self.wrapped_key_segment,
                self.cipher_text_segment,
                sep = SEGMENT_SEPARATOR
            ),
        }
    }
}

impl std::fmt::Display for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_wire())
    }
}

/// Parse an envelope string, reporting why it was rejected.
pub fn parse_envelope(input: &str) -> Result<Envelope, EnvelopeError> {
    let parts: Vec<&str> = input.split(SEGMENT_SEPARATOR).collect();
    if parts.len() != 2 && parts.len() != 3 {
        return Err(EnvelopeError::SegmentCount(parts.len()));
    }
    if let Some(index) = parts.iter().position(|p| p.is_empty()) {
        return Err(EnvelopeError::EmptySegment(index));
    }

    let wrapped_key =
        base64_decode(parts[0]).map_err(|_| EnvelopeError::InvalidBase64 { index: 0 })?;

    let cipher_index = parts.len() - 1;
    let cipher_text = base64_decode(parts[cipher_index])
        .map_err(|_| EnvelopeError::InvalidBase64 { index: cipher_index })?;
    if cipher_text.len() < AES_GCM_IV_LENGTH + AES_GCM_TAG_LENGTH {
        return Err(EnvelopeError::ImplausibleLength {
            index: cipher_index,
            len: cipher_text.len(),
        });
    }

    let pin_wrapped = if parts.len() == 3 {
        if base64_decode(parts[1]).is_err() {
            return Err(EnvelopeError::InvalidBase64 { index: 1 });
        }
        Some(PinWrappedKey::parse(parts[1])?)
    } else {
        None
    };

    Ok(Envelope {
        wrapped_key,
        wrapped_key_segment: parts[0].to_string(),
        pin_wrapped,
        cipher_text_segment: parts[cipher_index].to_string(),
    })
}

/// Parse an envelope, collapsing every rejection to `None`.
pub fn try_parse_envelope(input: &str) -> Option<Envelope> {
    parse_envelope(input).ok()
}
