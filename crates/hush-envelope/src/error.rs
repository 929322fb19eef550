use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Envelope must have 2 or 3 segments, got {0}")]
    SegmentCount(usize),

    #[error("Envelope segment {0} is empty")]
    EmptySegment(usize),

    #[error("Envelope segment {index} is not valid base64")]
    InvalidBase64 { index: usize },

    #[error("Envelope segment {index} has implausible length {len}")]
    ImplausibleLength { index: usize, len: usize },

    #[error("Invalid PIN-wrapped key: {0}")]
    InvalidPinSegment(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] hush_crypto::CryptoError),
}
