//! # conduit-crypto
//!
//! Cryptographic primitives for the `conduit` peer-to-peer stream multiplexer.
//!
//! This crate provides:
//! - RSA-2048 long-term identity keypairs (sign / verify / marshal public)
//! - Self-certifying PeerIDs (`hex(sha256(public_bytes))`)
//! - Directional AEAD session keys, derived from a handshake secret via HKDF-SHA256
//! - Secure random number generation
//!
//! ## Cryptographic suite
//!
//! | Function | Algorithm | Notes |
//! |----------|-----------|-------|
//! | Identity / signatures | RSA-2048, PKCS#1v1.5 | also used to wrap the handshake secret |
//! | PeerID / signature digest | SHA-256 | |
//! | Session AEAD | `ChaCha20-Poly1305` | 12-byte random nonce per seal |
//! | Directional key derivation | HKDF-SHA256 | one key per direction, see [`aead`] |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aead;
pub mod error;
pub mod hash;
pub mod identity;
pub mod peer_id;
pub mod random;

pub use aead::SessionKeys;
pub use error::CryptoError;
pub use identity::{Keypair, PublicKey, Signature};
pub use peer_id::PeerId;

/// RSA key size in bits.
pub const RSA_KEY_BITS: usize = identity::KEY_BITS;

/// Handshake shared-secret size in bytes.
pub const SHARED_SECRET_SIZE: usize = 32;

/// AEAD nonce size in bytes.
pub const AEAD_NONCE_SIZE: usize = 12;

/// AEAD authentication tag size in bytes.
pub const AEAD_TAG_SIZE: usize = 16;

/// PeerID digest size in bytes (SHA-256 output).
pub const PEER_ID_SIZE: usize = 32;
