//! A single multiplexed byte-stream over a connection: per-stream receive
//! queue, close signals, and idle timer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{Notify, mpsc};

use crate::connection::Connection;
use crate::envelope::{Envelope, PeerIdWire, Status};
use crate::error::{Error, Result};
use conduit_crypto::PeerId;

/// Which side flipped the stream to its terminal state.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ClosedReason {
    Local,
    Peer,
}

impl std::fmt::Display for ClosedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => f.write_str("closed locally"),
            Self::Peer => f.write_str("closed by peer"),
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Lock-free last-activity clock backing a stream's idle timer.
struct Activity(AtomicU64);

impl Activity {
    fn new() -> Self {
        Self(AtomicU64::new(now_ms()))
    }

    fn touch(&self) {
        self.0.store(now_ms(), Ordering::Relaxed);
    }

    fn idle_duration_ms(&self) -> u64 {
        now_ms().saturating_sub(self.0.load(Ordering::Relaxed))
    }
}

/// A one-shot latch, `Notify`-backed so waiters wake deterministically rather
/// than racing a channel close against it.
struct OnceFlag {
    fired: AtomicBool,
    notify: Notify,
}

impl OnceFlag {
    fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Returns `true` if this call is the one that fired it.
    fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            false
        } else {
            self.notify.notify_waiters();
            true
        }
    }

    async fn wait(&self) {
        loop {
            if self.is_fired() {
                return;
            }
            let notified = self.notify.notified();
            if self.is_fired() {
                return;
            }
            notified.await;
        }
    }
}

/// One multiplexed stream. Created either by a local `open_stream` call or
/// implicitly by the connection's read loop on first sight of a stream id.
pub struct Stream<T> {
    connection: Arc<Connection<T>>,
    protocol: String,
    stream_id: crate::envelope::StreamId,
    own_peer_id: PeerId,
    receive: tokio::sync::Mutex<mpsc::Receiver<Vec<u8>>>,
    local_closed: OnceFlag,
    peer_closed: OnceFlag,
    activity: Activity,
    cleanup: Box<dyn Fn() + Send + Sync>,
    sender: mpsc::Sender<Vec<u8>>,
}

impl<T> Stream<T>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    /// Build a new stream and the sender half its owning connection's read
    /// loop uses to enqueue inbound payloads.
    ///
    /// The returned `Sender` is also kept internally (see [`Self::try_enqueue`])
    /// so the caller is free to drop its copy immediately; the channel only
    /// closes once both are gone.
    pub(crate) fn new(
        connection: Arc<Connection<T>>,
        protocol: String,
        stream_id: crate::envelope::StreamId,
        own_peer_id: PeerId,
        receive_queue_capacity: usize,
        stream_max_inactive: Duration,
        cleanup: Box<dyn Fn() + Send + Sync>,
    ) -> (Arc<Self>, mpsc::Sender<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(receive_queue_capacity);
        let stream = Arc::new(Self {
            connection,
            protocol,
            stream_id,
            own_peer_id,
            receive: tokio::sync::Mutex::new(rx),
            local_closed: OnceFlag::new(),
            peer_closed: OnceFlag::new(),
            activity: Activity::new(),
            cleanup,
            sender: tx.clone(),
        });
        spawn_idle_timer(&stream, stream_max_inactive);
        (stream, tx)
    }

    /// Non-blocking enqueue of one inbound payload, used by the multiplexer's
    /// read loop. Fails only when the bounded queue is already full, which is
    /// fatal to the owning connection (§4.G step 5).
    pub(crate) fn try_enqueue(&self, data: Vec<u8>) -> std::result::Result<(), mpsc::error::TrySendError<Vec<u8>>> {
        self.sender.try_send(data)
    }

    #[must_use]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    #[must_use]
    pub fn stream_id(&self) -> crate::envelope::StreamId {
        self.stream_id
    }

    fn closed_error(&self) -> Error {
        if self.local_closed.is_fired() {
            Error::StreamClosed(ClosedReason::Local)
        } else {
            Error::StreamClosed(ClosedReason::Peer)
        }
    }

    /// Send one payload as a fresh envelope over the owning connection.
    pub async fn write(&self, data: Vec<u8>) -> Result<usize> {
        if self.local_closed.is_fired() {
            return Err(Error::StreamClosed(ClosedReason::Local));
        }
        if self.peer_closed.is_fired() {
            return Err(Error::StreamClosed(ClosedReason::Peer));
        }
        let len = data.len();
        let envelope = Envelope {
            protocol: self.protocol.clone(),
            stream_id: self.stream_id,
            peer_id: PeerIdWire(self.own_peer_id),
            status: Status::Ok,
            data,
        };
        self.connection.send_envelope(&envelope).await?;
        self.activity.touch();
        Ok(len)
    }

    /// Return the next payload, in enqueue order. Buffered data is always
    /// drained before end-of-stream is reported, even once the peer has
    /// closed: the `recv` arm is listed first in a biased `select!`, so any
    /// payload already sitting in the queue is returned before either close
    /// signal is allowed to resolve the call.
    pub async fn read(&self) -> Result<Vec<u8>> {
        if self.local_closed.is_fired() {
            return Err(Error::StreamClosed(ClosedReason::Local));
        }
        let mut receive = self.receive.lock().await;
        tokio::select! {
            biased;
            got = receive.recv() => match got {
                Some(payload) => {
                    self.activity.touch();
                    Ok(payload)
                }
                None => Err(self.closed_error()),
            },
            () = self.local_closed.wait() => Err(Error::StreamClosed(ClosedReason::Local)),
            () = self.peer_closed.wait() => Err(Error::StreamClosed(ClosedReason::Peer)),
        }
    }

    /// Flip the local-closed signal, drop out of the stream table, and tell
    /// the peer unless it already told us first. Idempotent.
    pub async fn close(&self) -> Result<()> {
        if !self.local_closed.fire() {
            return Ok(());
        }
        (self.cleanup)();
        if self.peer_closed.is_fired() {
            return Ok(());
        }
        let envelope = Envelope {
            protocol: self.protocol.clone(),
            stream_id: self.stream_id,
            peer_id: PeerIdWire(self.own_peer_id),
            status: Status::Close,
            data: Vec::new(),
        };
        self.connection.send_envelope(&envelope).await
    }

    /// Called by the owning connection's read loop on receipt of a
    /// `Close`-status envelope for this stream.
    pub(crate) fn mark_peer_closed(&self) {
        self.peer_closed.fire();
    }

    /// Called when the owning connection itself tears down (disconnect, idle
    /// timeout, or a read-loop failure). Unified teardown: regardless of the
    /// trigger, every stream on that connection transitions to locally closed
    /// rather than peer-closed, since there is no longer a live peer to have
    /// closed it. Does not touch the stream table; the caller already holds
    /// that lock and removes the entry itself.
    pub(crate) fn mark_locally_closed(&self) {
        self.local_closed.fire();
    }

    fn is_terminal(&self) -> bool {
        self.local_closed.is_fired() || self.peer_closed.is_fired()
    }
}

/// Recompute the deadline on every pass so a `write`/`read` resetting
/// `activity` naturally reschedules the wakeup, rather than polling on a
/// fixed interval.
fn spawn_idle_timer<T>(stream: &Arc<Stream<T>>, max_inactive: Duration)
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    if max_inactive.is_zero() {
        return;
    }
    let weak = Arc::downgrade(stream);
    tokio::spawn(async move {
        loop {
            let Some(stream) = weak.upgrade() else {
                return;
            };
            if stream.is_terminal() {
                return;
            }
            let idle_ms = stream.activity.idle_duration_ms();
            let max_ms = max_inactive.as_millis() as u64;
            if idle_ms >= max_ms {
                let _ = stream.close().await;
                return;
            }
            let remaining = Duration::from_millis(max_ms - idle_ms);
            drop(stream);
            tokio::time::sleep(remaining).await;
        }
    });
}
