/// AES-GCM IV length in bytes (96 bits per NIST recommendation).
pub const AES_GCM_IV_LENGTH: usize = 12;

/// AES-GCM tag length in bytes (128 bits).
pub const AES_GCM_TAG_LENGTH: usize = 16;

/// AES key length in bytes (256 bits). Conversation keys, per-message keys and
/// master unlock keys all have this length.
pub const AES_KEY_LENGTH: usize = 32;

/// RSA modulus size for device keypairs.
pub const RSA_KEY_BITS: usize = 2048;

/// Length of an RSA-2048 PKCS#1 v1.5 ciphertext.
pub const RSA_WRAPPED_KEY_LENGTH: usize = RSA_KEY_BITS / 8;

/// PBKDF2-HMAC-SHA256 iteration count for the master unlock key.
///
/// Every device of a user must use the same count, otherwise the same PIN
/// derives different keys and cross-device unlock breaks.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Random salt length for PIN credentials.
pub const PIN_SALT_LENGTH: usize = 16;

/// Number of ASCII digits in a PIN.
pub const PIN_LENGTH: usize = 6;

/// SHA-256 digest length.
pub const SHA256_LENGTH: usize = 32;
