//! A registered, post-handshake connection: a serialised writer over half
//! the transport, attributed to exactly one authenticated remote peer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use conduit_crypto::PeerId;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::Mutex;

use crate::envelope::Envelope;
use crate::error::Result;
use crate::secure::{SecureChannel, SecureReader, SecureWriter};

pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

fn next_connection_id() -> ConnectionId {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// One established, authenticated connection to a peer.
///
/// Only the write half lives here, behind a lock serialising outbound frames.
/// The read half is handed back by [`Connection::new`] for the caller (the
/// multiplexer's accept/dial path) to drive as the connection's single read
/// loop — see the design note on folding the idle timer into that loop
/// instead of a dedicated timer task.
pub struct Connection<T> {
    id: ConnectionId,
    remote_peer_id: PeerId,
    writer: Mutex<SecureWriter<WriteHalf<T>>>,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Split a handshake-established channel into a registered connection and
    /// the read half its read loop will drive.
    #[must_use]
    pub fn new(remote_peer_id: PeerId, channel: SecureChannel<T>) -> (Arc<Self>, SecureReader<ReadHalf<T>>) {
        let (reader, writer) = channel.into_split();
        let connection = Arc::new(Self {
            id: next_connection_id(),
            remote_peer_id,
            writer: Mutex::new(writer),
        });
        (connection, reader)
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub fn remote_peer_id(&self) -> PeerId {
        self.remote_peer_id
    }

    /// Send one envelope. Mutually exclusive with any other write on this
    /// connection; never held across a stream's own suspension points.
    pub async fn send_envelope(&self, envelope: &Envelope) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write(envelope).await
    }

    /// Shut down the transport's write half. Idempotent at the OS level;
    /// a second call just reports the socket is already closed, which callers
    /// tearing down a connection ignore.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}
