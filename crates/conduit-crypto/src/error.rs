//! Cryptographic error types.

use std::borrow::Cow;
use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// RSA key generation failed
    #[error("key generation failed: {0}")]
    KeyGeneration(Cow<'static, str>),

    /// A public key could not be parsed from its marshalled bytes
    #[error("failed to parse public key: {0}")]
    KeyParse(Cow<'static, str>),

    /// Signing failed
    #[error("signing failed: {0}")]
    Sign(Cow<'static, str>),

    /// Signature did not verify
    #[error("signature verification failed")]
    Verify,

    /// Asymmetric (RSA) encryption of the transient handshake secret failed
    #[error("asymmetric encryption failed: {0}")]
    AsymmetricEncrypt(Cow<'static, str>),

    /// Asymmetric (RSA) decryption of the transient handshake secret failed
    #[error("asymmetric decryption failed: {0}")]
    AsymmetricDecrypt(Cow<'static, str>),

    /// AEAD encryption failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (authentication failure)
    #[error("decryption failed: authentication failure")]
    DecryptionFailed,

    /// Invalid key length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Invalid nonce length
    #[error("invalid nonce length: expected {expected}, got {actual}")]
    InvalidNonceLength { expected: usize, actual: usize },

    /// HKDF directional key derivation failed
    #[error("key derivation failed: {0}")]
    Derivation(Cow<'static, str>),

    /// Random number generation failed
    #[error("random number generation failed")]
    RandomFailed,
}

impl CryptoError {
    pub const fn key_generation(msg: &'static str) -> Self {
        Self::KeyGeneration(Cow::Borrowed(msg))
    }

    pub const fn key_parse(msg: &'static str) -> Self {
        Self::KeyParse(Cow::Borrowed(msg))
    }

    /// Everything here is deterministic given its input except exhausting the
    /// system RNG, so only that variant is worth a retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RandomFailed)
    }
}

pub type Result<T> = std::result::Result<T, CryptoError>;
