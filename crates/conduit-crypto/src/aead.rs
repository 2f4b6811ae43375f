//! Directional AEAD session keys derived from the handshake secret.
//!
//! A single shared key used for both directions is a correctness hazard: random
//! 96-bit nonces collide across directions at the birthday bound (~2^48 sealed
//! messages). Two directional keys, derived via HKDF-SHA256 with direction-specific
//! info strings, close that hole while keeping the 12-byte nonce the wire format
//! requires.

use chacha20poly1305::aead::{Aead, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use std::borrow::Cow;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

const INITIATOR_TO_RESPONDER: &[u8] = b"b2b/initiator-to-responder";
const RESPONDER_TO_INITIATOR: &[u8] = b"b2b/responder-to-initiator";

/// The two directional keys derived from a handshake's shared secret `K`.
///
/// Zeroized on drop; the raw `K` is never stored here, only its derivatives.
#[derive(ZeroizeOnDrop)]
pub struct SessionKeys {
    send: [u8; 32],
    recv: [u8; 32],
}

impl SessionKeys {
    /// Derive directional keys from the handshake secret.
    ///
    /// `initiator` selects which derived key is used for sending: the initiator
    /// sends on the initiator-to-responder key and receives on the other, and the
    /// responder does the reverse, so both sides agree on which physical bytes
    /// flowing over the wire were sealed with which key.
    pub fn derive(shared_secret: &[u8; 32], initiator: bool) -> Result<Self, CryptoError> {
        let hk = Hkdf::<Sha256>::new(None, shared_secret);

        let mut i2r = [0u8; 32];
        hk.expand(INITIATOR_TO_RESPONDER, &mut i2r)
            .map_err(|_| CryptoError::Derivation(Cow::Borrowed("initiator-to-responder expand failed")))?;

        let mut r2i = [0u8; 32];
        hk.expand(RESPONDER_TO_INITIATOR, &mut r2i)
            .map_err(|_| CryptoError::Derivation(Cow::Borrowed("responder-to-initiator expand failed")))?;

        let (send, recv) = if initiator { (i2r, r2i) } else { (r2i, i2r) };
        Ok(Self { send, recv })
    }

    /// Seal `plaintext` with the send-direction key, returning `nonce || ciphertext || tag`.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.send));
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Open a `nonce || ciphertext || tag` blob sealed with the peer's matching
    /// send key (our recv key).
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::InvalidNonceLength {
                expected: NONCE_LEN + TAG_LEN,
                actual: sealed.len(),
            });
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.recv));
        let nonce = Nonce::from_slice(nonce_bytes);
        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys").finish_non_exhaustive()
    }
}

impl Drop for SessionKeys {
    fn drop(&mut self) {
        self.send.zeroize();
        self.recv.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trip() {
        let secret = [3u8; 32];
        let initiator = SessionKeys::derive(&secret, true).unwrap();
        let responder = SessionKeys::derive(&secret, false).unwrap();

        let sealed = initiator.seal(b"hello responder").unwrap();
        let opened = responder.open(&sealed).unwrap();
        assert_eq!(opened, b"hello responder");
    }

    #[test]
    fn send_and_recv_keys_differ() {
        let secret = [9u8; 32];
        let initiator = SessionKeys::derive(&secret, true).unwrap();

        // Sealing and opening with the same side's own keys must fail: send and
        // recv are deliberately different keys, so this isn't a loopback cipher.
        let sealed = initiator.seal(b"x").unwrap();
        assert!(initiator.open(&sealed).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails_to_open() {
        let secret = [1u8; 32];
        let initiator = SessionKeys::derive(&secret, true).unwrap();
        let responder = SessionKeys::derive(&secret, false).unwrap();

        let mut sealed = initiator.seal(b"integrity matters").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(responder.open(&sealed).is_err());
    }

    #[test]
    fn wrong_secret_cannot_open() {
        let a = SessionKeys::derive(&[1u8; 32], true).unwrap();
        let b = SessionKeys::derive(&[2u8; 32], false).unwrap();
        let sealed = a.seal(b"secret").unwrap();
        assert!(b.open(&sealed).is_err());
    }
}
