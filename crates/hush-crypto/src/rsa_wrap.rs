//! RSA-2048 device keys and PKCS#1 v1.5 key wrapping.
//!
//! Symmetric keys are wrapped as raw 32 bytes, PKCS#1 v1.5 padded (not OAEP),
//! so envelopes stay readable by runtimes that only implement v1.5.
//! Public keys travel as SPKI PEM, private keys as PKCS#8 PEM. PKCS#1 PEM is
//! accepted on import.

use rand_core::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroizing;

use crate::aes_gcm::{key_from_slice, SymmetricKey};
use crate::error::CryptoError;
use crate::types::{AES_KEY_LENGTH, RSA_KEY_BITS};

/// A device's RSA keypair. The private half zeroizes on drop.
#[derive(Clone)]
pub struct DeviceKeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl std::fmt::Debug for DeviceKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceKeyPair")
            .field("bits", &RSA_KEY_BITS)
            .finish_non_exhaustive()
    }
}

impl DeviceKeyPair {
    /// Generate a fresh RSA-2048 keypair.
    ///
    /// CPU-heavy; async callers should run it on a blocking worker.
    pub fn generate() -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
            .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Import a keypair from a private key PEM (PKCS#8 or PKCS#1).
    pub fn from_private_pem(pem: &str) -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| CryptoError::InvalidPem(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Export the private key as PKCS#8 PEM.
    pub fn private_pem(&self) -> Result<Zeroizing<String>, CryptoError> {
        self.private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidPem(e.to_string()))
    }

    /// Export the public key as SPKI PEM.
    pub fn public_pem(&self) -> Result<String, CryptoError> {
        export_public_pem(&self.public)
    }

    /// The public half.
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// Unwrap a symmetric key wrapped for this device.
    pub fn unwrap_key(&self, wrapped: &[u8]) -> Result<SymmetricKey, CryptoError> {
        unwrap_key(&self.private, wrapped)
    }
}

/// Export a public key as SPKI PEM.
pub fn export_public_pem(key: &RsaPublicKey) -> Result<String, CryptoError> {
    key.to_public_key_pem(LineEnding::LF)
        .map_err(|e| CryptoError::InvalidPem(e.to_string()))
}

/// Import a public key from SPKI PEM (PKCS#1 PEM also accepted).
pub fn import_public_pem(pem: &str) -> Result<RsaPublicKey, CryptoError> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| CryptoError::InvalidPem(e.to_string()))
}

/// Wrap a 32-byte symmetric key for an RSA public key (PKCS#1 v1.5).
pub fn wrap_key(public_key: &RsaPublicKey, key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if key.len() != AES_KEY_LENGTH {
        return Err(CryptoError::InvalidKeyLength {
            expected: AES_KEY_LENGTH,
            got: key.len(),
        });
    }
    public_key
        .encrypt(&mut OsRng, Pkcs1v15Encrypt, key)
        .map_err(|e| CryptoError::WrapFailed(e.to_string()))
}

/// Unwrap a symmetric key with an RSA private key.
///
/// A structurally valid unwrap that yields anything other than 32 bytes means
/// the key was wrapped for a different keypair; it is reported as
/// [`CryptoError::InvalidKeyLength`] so callers can tell it apart from padding
/// failures.
pub fn unwrap_key(private_key: &RsaPrivateKey, wrapped: &[u8]) -> Result<SymmetricKey, CryptoError> {
    let raw = Zeroizing::new(
        private_key
            .decrypt(Pkcs1v15Encrypt, wrapped)
            .map_err(|e| CryptoError::UnwrapFailed(e.to_string()))?,
    );
    key_from_slice(&raw)
}
