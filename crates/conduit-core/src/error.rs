//! Error taxonomy for the multiplexer and everything beneath it.
//!
//! Mirrors the semantic categories the library promises callers: transport and
//! framing failures are fatal to a connection, handshake failures never leak
//! registered state, and stream-level closures are ordinary, expected outcomes
//! rather than exceptional ones.

use std::borrow::Cow;
use std::io;

use conduit_crypto::CryptoError;

use crate::handshake::HandshakeError;
use crate::stream::ClosedReason;

/// Top-level error returned by the multiplexer's public operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The underlying byte transport failed to read or write. Fatal to the
    /// connection.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// A length prefix, truncated frame, or envelope deserialisation failed.
    /// Fatal to the connection.
    #[error("framing error: {0}")]
    Framing(Cow<'static, str>),

    /// AEAD open failure, asymmetric sign/verify failure, or key parse failure.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The handshake failed; no connection was registered.
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// The application tried to use a stream after it closed.
    #[error("stream closed: {0}")]
    StreamClosed(ClosedReason),

    /// A stream or connection idle timer fired.
    #[error("timed out waiting for activity")]
    Timeout,

    /// `on_incoming` rejected an inbound connection.
    #[error("connection rejected by admission gate: {0}")]
    Admission(Cow<'static, str>),

    /// The peer already holds the configured maximum number of connections.
    /// Recoverable — the caller may retry.
    #[error("peer already has the maximum number of connections")]
    MaxConnectionsPerPeer,

    /// A stream's bounded receive queue filled up. Fatal to the connection.
    #[error("stream receive queue exceeded its capacity")]
    ReceiveQueueFull,

    /// `open_stream` was called for a peer with no registered connection.
    #[error("no connection registered for peer")]
    NoConnection,
}

impl Error {
    pub fn framing(msg: &'static str) -> Self {
        Self::Framing(Cow::Borrowed(msg))
    }

    pub fn framing_owned(msg: String) -> Self {
        Self::Framing(Cow::Owned(msg))
    }

    pub fn admission(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Admission(msg.into())
    }

    /// Whether a read-loop-level occurrence of this error tears the whole
    /// connection down (and with it every stream registered on it).
    #[must_use]
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Framing(_) | Self::Crypto(_) | Self::ReceiveQueueFull
        )
    }

    /// Whether the caller can reasonably retry the operation that produced this
    /// error without changing anything else.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::MaxConnectionsPerPeer | Self::NoConnection)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
