//! Standard-alphabet base64 as used on the wire.
//!
//! Encoding always pads. Decoding accepts input with or without `=` padding,
//! but padding that is present must be exactly right.

use base64ct::{Base64, Base64Unpadded, Encoding};

use crate::error::CryptoError;

/// Base64 encode bytes with padding.
pub fn base64_encode(data: &[u8]) -> String {
    Base64::encode_string(data)
}

/// Base64 decode a string, padding optional.
pub fn base64_decode(s: &str) -> Result<Vec<u8>, CryptoError> {
    let decoded = if s.ends_with('=') {
        Base64::decode_vec(s)
    } else {
        Base64Unpadded::decode_vec(s)
    };
    decoded.map_err(|e| CryptoError::InvalidBase64(e.to_string()))
}
