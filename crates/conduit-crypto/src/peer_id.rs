//! Self-certifying peer identifiers.

use crate::hash::sha256;
use std::fmt;
use std::str::FromStr;

/// A peer's identifier: `hex(sha256(marshalled_public_key))`.
///
/// Self-certifying — any holder of a peer's public key bytes can recompute this
/// and compare, without trusting a third party.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId([u8; 32]);

impl PeerId {
    /// Derive a PeerID from the marshalled (PKCS#1 DER) bytes of a public key.
    #[must_use]
    pub fn from_public_bytes(public_bytes: &[u8]) -> Self {
        Self(sha256(public_bytes))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Error returned when a hex string isn't a valid PeerID.
#[derive(Debug, thiserror::Error)]
#[error("invalid peer id: {0}")]
pub struct ParsePeerIdError(String);

impl FromStr for PeerId {
    type Err = ParsePeerIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| ParsePeerIdError(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ParsePeerIdError(format!("expected 32 bytes, got hex of different length: {s}")))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PeerId").field(&self.to_hex()).finish()
    }
}
