//! # conduit-core
//!
//! A peer-to-peer transport that establishes mutually-authenticated, end-to-end
//! encrypted TCP connections and multiplexes many independent bidirectional
//! byte-streams over each one, each stream carrying an application-chosen
//! protocol name.
//!
//! ## Layout
//!
//! | Module | Responsibility |
//! |---|---|
//! | [`envelope`] | The routed message unit and its wire JSON shape |
//! | [`framing`] | Length-prefixed binary framing |
//! | [`insecure`] | Plaintext framed channel, handshake-only |
//! | [`secure`] | AEAD-sealed framed channel |
//! | [`handshake`] | The five-step mutual-authentication state machine |
//! | [`connection`] | A registered, post-handshake connection |
//! | [`stream`] | A single multiplexed byte-stream |
//! | [`registry`] | The connection registry and stream table |
//! | [`switch`] | The multiplexer: accept/dial loops, routing, dispatch |
//! | [`error`] | The shared error taxonomy |
//!
//! ## Example
//!
//! ```no_run
//! use conduit_core::{Options, Switch};
//! use conduit_crypto::Keypair;
//!
//! # async fn run() -> conduit_core::Result<()> {
//! let identity = Keypair::generate()?;
//! let switch = Switch::new(identity, Options::default());
//! switch.add_protocol("echo", |stream| {
//!     Box::pin(async move {
//!         if let Ok(payload) = stream.read().await {
//!             let _ = stream.write(payload).await;
//!         }
//!     })
//! });
//! switch.listen("127.0.0.1:0").await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod connection;
pub mod envelope;
pub mod error;
pub mod framing;
pub mod handshake;
pub mod insecure;
pub mod options;
pub mod registry;
pub mod secure;
pub mod stream;
pub mod switch;

pub use envelope::{Envelope, StreamId};
pub use error::{Error, Result};
pub use options::Options;
pub use stream::{ClosedReason, Stream};
pub use switch::{HandlerFuture, Switch};
