//! PIN-wrapped key segment.
//!
//! The symmetric key is AES-256-GCM encrypted under the master unlock key and
//! serialized as `base64(UTF-8("base64(iv):base64(cipher‖tag)"))`, so it fits
//! in one envelope segment without introducing another `:`.

use hush_crypto::{
    aes_gcm_decrypt, aes_gcm_encrypt, base64_decode, base64_encode, key_from_slice, SymmetricKey,
    AES_GCM_IV_LENGTH, AES_GCM_TAG_LENGTH, AES_KEY_LENGTH,
};

use crate::error::EnvelopeError;

/// Length of an AES-GCM encrypted 32-byte key including its tag.
const WRAPPED_KEY_CIPHER_LENGTH: usize = AES_KEY_LENGTH + AES_GCM_TAG_LENGTH;

/// A symmetric key wrapped under a master unlock key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinWrappedKey {
    iv: [u8; AES_GCM_IV_LENGTH],
    cipher: Vec<u8>,
    segment: String,
}

impl PinWrappedKey {
    /// Parse the single-segment (outer base64) form.
    pub fn parse(segment: &str) -> Result<Self, EnvelopeError> {
        let inner = base64_decode(segment)
            .map_err(|e| EnvelopeError::InvalidPinSegment(format!("outer base64: {}", e)))?;
        let inner = String::from_utf8(inner)
            .map_err(|_| EnvelopeError::InvalidPinSegment("inner is not UTF-8".to_string()))?;
        let (iv, cipher) = parse_inner(&inner)?;
        Ok(Self {
            iv,
            cipher,
            segment: segment.to_string(),
        })
    }

    /// Parse a value from the out-of-band store column, which may hold either
    /// the single-segment form or the bare `iv:cipher` form.
    pub fn parse_stored(value: &str) -> Result<Self, EnvelopeError> {
        if value.contains(':') {
            let (iv, cipher) = parse_inner(value)?;
            return Ok(Self {
                iv,
                cipher,
                segment: base64_encode(value.as_bytes()),
            });
        }
        Self::parse(value)
    }

    /// The single-segment wire form.
    pub fn as_segment(&self) -> &str {
        &self.segment
    }
}

fn parse_inner(inner: &str) -> Result<([u8; AES_GCM_IV_LENGTH], Vec<u8>), EnvelopeError> {
    let mut parts = inner.split(':');
    let (Some(iv_b64), Some(cipher_b64), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(EnvelopeError::InvalidPinSegment(
            "expected iv:cipher".to_string(),
        ));
    };

    let iv_bytes = base64_decode(iv_b64)
        .map_err(|e| EnvelopeError::InvalidPinSegment(format!("iv: {}", e)))?;
    let iv: [u8; AES_GCM_IV_LENGTH] = iv_bytes.as_slice().try_into().map_err(|_| {
        EnvelopeError::InvalidPinSegment(format!("iv must be 12 bytes, got {}", iv_bytes.len()))
    })?;

    let cipher = base64_decode(cipher_b64)
        .map_err(|e| EnvelopeError::InvalidPinSegment(format!("cipher: {}", e)))?;
    if cipher.len() != WRAPPED_KEY_CIPHER_LENGTH {
        return Err(EnvelopeError::InvalidPinSegment(format!(
            "cipher must be {} bytes, got {}",
            WRAPPED_KEY_CIPHER_LENGTH,
            cipher.len()
        )));
    }
    Ok((iv, cipher))
}

/// Wrap a symmetric key under the master unlock key.
pub fn pin_wrap_key(master_key: &[u8], key: &[u8]) -> Result<PinWrappedKey, EnvelopeError> {
    if key.len() != AES_KEY_LENGTH {
        return Err(hush_crypto::CryptoError::InvalidKeyLength {
            expected: AES_KEY_LENGTH,
            got: key.len(),
        }
        .into());
    }
    let sealed = aes_gcm_encrypt(master_key, key)?;
    let (iv_bytes, cipher) = sealed.split_at(AES_GCM_IV_LENGTH);

    let inner = format!("{}:{}", base64_encode(iv_bytes), base64_encode(cipher));
    let mut iv = [0u8; AES_GCM_IV_LENGTH];
    iv.copy_from_slice(iv_bytes);
    Ok(PinWrappedKey {
        iv,
        cipher: cipher.to_vec(),
        segment: base64_encode(inner.as_bytes()),
    })
}

/// Recover the symmetric key from a PIN-wrapped key.
pub fn pin_unwrap_key(
    master_key: &[u8],
    wrapped: &PinWrappedKey,
) -> Result<SymmetricKey, EnvelopeError> {
    let mut sealed = Vec::with_capacity(AES_GCM_IV_LENGTH + wrapped.cipher.len());
    sealed.extend_from_slice(&wrapped.iv);
    sealed.extend_from_slice(&wrapped.cipher);
    let raw = zeroize::Zeroizing::new(aes_gcm_decrypt(master_key, &sealed)?);
    Ok(key_from_slice(&raw)?)
}
