//! Long-term asymmetric identity: RSA-2048 keypairs used for PeerID derivation,
//! handshake signatures, and wrapping the transient handshake secret.

use rsa::pkcs1::{DecodeRsaPublicKey, EncodeRsaPublicKey};
use rsa::signature::SignatureEncoding;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::borrow::Cow;
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;
use crate::peer_id::PeerId;

/// RSA key size used throughout, per the 2048-bit contract of the handshake design.
pub const KEY_BITS: usize = 2048;

/// A detached RSA signature.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// The remote peer's long-term public key.
///
/// Parsing always succeeds or fails outright — there is no partial trust here;
/// callers derive the [`PeerId`] from the same bytes they parsed, so a forged key
/// can never claim an identity it didn't generate.
#[derive(Clone)]
pub struct PublicKey {
    inner: RsaPublicKey,
    marshalled: Vec<u8>,
}

impl PublicKey {
    /// Parse a public key from its PKCS#1 DER marshalling.
    pub fn parse(bytes: &[u8]) -> Result<Self, CryptoError> {
        let inner = RsaPublicKey::from_pkcs1_der(bytes)
            .map_err(|e| CryptoError::KeyParse(Cow::Owned(e.to_string())))?;
        Ok(Self {
            inner,
            marshalled: bytes.to_vec(),
        })
    }

    /// The deterministic marshalled form used for PeerID derivation and signature
    /// verification.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.marshalled
    }

    /// Self-certifying identifier for this key.
    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        PeerId::from_public_bytes(&self.marshalled)
    }

    /// Verify a signature over `message`, produced by the holder of the matching
    /// private key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        use rsa::signature::Verifier;
        let verifying = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(self.inner.clone());
        let sig = rsa::pkcs1v15::Signature::try_from(signature.as_bytes())
            .map_err(|_| CryptoError::Verify)?;
        verifying.verify(message, &sig).map_err(|_| CryptoError::Verify)
    }

    /// Encrypt a short message (the transient handshake secret) so only the
    /// holder of the matching private key can recover it.
    pub fn encrypt(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut rng = rand::rngs::OsRng;
        self.inner
            .encrypt(&mut rng, Pkcs1v15Encrypt, message)
            .map_err(|e| CryptoError::AsymmetricEncrypt(Cow::Owned(e.to_string())))
    }
}

/// A long-term RSA keypair.
#[derive(ZeroizeOnDrop)]
pub struct Keypair {
    #[zeroize(skip)]
    public: RsaPublicKey,
    private: RsaPrivateKey,
    #[zeroize(skip)]
    marshalled_public: Vec<u8>,
}

impl Keypair {
    /// Generate a fresh 2048-bit keypair from the OS CSPRNG.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut rng = rand::rngs::OsRng;
        let private = RsaPrivateKey::new(&mut rng, KEY_BITS)
            .map_err(|e| CryptoError::KeyGeneration(Cow::Owned(e.to_string())))?;
        let public = RsaPublicKey::from(&private);
        let marshalled_public = public
            .to_pkcs1_der()
            .map_err(|e| CryptoError::KeyGeneration(Cow::Owned(e.to_string())))?
            .as_bytes()
            .to_vec();
        Ok(Self {
            public,
            private,
            marshalled_public,
        })
    }

    /// This peer's self-certifying identifier.
    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        PeerId::from_public_bytes(&self.marshalled_public)
    }

    /// The deterministic marshalled form of the public key, sent in the first
    /// handshake step.
    #[must_use]
    pub fn public_bytes(&self) -> &[u8] {
        &self.marshalled_public
    }

    /// The public half, for handing to peers who've already received our bytes.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: self.public.clone(),
            marshalled: self.marshalled_public.clone(),
        }
    }

    /// Sign a message with the private key.
    pub fn sign(&self, message: &[u8]) -> Result<Signature, CryptoError> {
        use rsa::signature::Signer;
        let signing = rsa::pkcs1v15::SigningKey::<Sha256>::new(self.private.clone());
        let sig = signing
            .try_sign(message)
            .map_err(|e| CryptoError::Sign(Cow::Owned(e.to_string())))?;
        Ok(Signature(sig.to_vec()))
    }

    /// Decrypt a message sent to us via [`PublicKey::encrypt`].
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.private
            .decrypt(Pkcs1v15Encrypt, ciphertext)
            .map_err(|e| CryptoError::AsymmetricDecrypt(Cow::Owned(e.to_string())))
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("peer_id", &self.peer_id())
            .finish_non_exhaustive()
    }
}
