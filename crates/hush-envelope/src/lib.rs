//! Message envelope wire format.
//!
//! `wrappedKey[":"wrappedKeyByPin]":"cipherText`, every segment standard base64.

pub mod envelope;
pub mod error;
pub mod pin_segment;

pub use envelope::{parse_envelope, try_parse_envelope, Envelope, SEGMENT_SEPARATOR};
pub use error::EnvelopeError;
pub use pin_segment::{pin_unwrap_key, pin_wrap_key, PinWrappedKey};
