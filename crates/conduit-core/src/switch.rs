//! The multiplexer: accept/dial loops, the per-connection frame router, and
//! protocol-handler dispatch.
//!
//! Grounded on `examples/original_source/b2b.go`'s `addConn`/`getConn`/`handle`/
//! `NewStream` shape, restructured around the `Arc<Inner>` + `#[derive(Clone)]`
//! node pattern the teacher crate uses throughout its `node::Node`.

use std::borrow::Cow;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use conduit_crypto::{Keypair, PeerId};
use tokio::io::ReadHalf;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

use crate::connection::Connection;
use crate::envelope::StreamId;
use crate::error::{Error, Result};
use crate::handshake::{initiator_handshake, responder_handshake};
use crate::options::Options;
use crate::registry::Registry;
use crate::secure::{SecureChannel, SecureReader};
use crate::stream::Stream;

/// The future a protocol handler returns. Handlers run on their own spawned
/// task; nothing here polls them to completion inline.
pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A registered protocol handler: invoked once per newly-created stream whose
/// `protocol` field matches, on a fresh task, with ownership of the stream.
pub type Handler = Arc<dyn Fn(Arc<Stream<TcpStream>>) -> HandlerFuture + Send + Sync>;

/// The optional admission gate an application may install with
/// [`Switch::set_on_incoming`]. Returning `Err` vetoes the inbound connection
/// before it is registered.
pub type AdmissionGate = Arc<dyn Fn(PeerId) -> std::result::Result<(), Cow<'static, str>> + Send + Sync>;

struct Inner {
    identity: Keypair,
    options: Options,
    registry: Registry<TcpStream>,
    protocols: Mutex<HashMap<String, Handler>>,
    on_incoming: Mutex<Option<AdmissionGate>>,
}

/// The library's top-level handle: one per local identity. Cheap to clone —
/// every clone shares the same connection registry, stream table, and
/// protocol map.
#[derive(Clone)]
pub struct Switch {
    inner: Arc<Inner>,
}

impl Switch {
    /// Build a new, unstarted switch for the given long-term identity.
    #[must_use]
    pub fn new(identity: Keypair, options: Options) -> Self {
        let registry = Registry::new(options.max_connections_per_peer);
        Self {
            inner: Arc::new(Inner {
                identity,
                options,
                registry,
                protocols: Mutex::new(HashMap::new()),
                on_incoming: Mutex::new(None),
            }),
        }
    }

    /// This switch's own self-certifying identifier.
    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        self.inner.identity.peer_id()
    }

    /// Register a handler dispatched on every newly-created stream whose
    /// envelope `protocol` field matches `name`.
    pub fn add_protocol<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Arc<Stream<TcpStream>>) -> HandlerFuture + Send + Sync + 'static,
    {
        self.inner
            .protocols
            .lock()
            .unwrap()
            .insert(name.into(), Arc::new(handler));
    }

    /// Install an admission gate invoked on every inbound connection after a
    /// successful handshake and before registration. Returning `Err` closes
    /// the socket without registering a connection.
    pub fn set_on_incoming<F>(&self, gate: F)
    where
        F: Fn(PeerId) -> std::result::Result<(), Cow<'static, str>> + Send + Sync + 'static,
    {
        *self.inner.on_incoming.lock().unwrap() = Some(Arc::new(gate));
    }

    /// Accept connections on `address` until a fatal listener error occurs.
    /// Individual accept/handshake failures are logged and do not stop the
    /// loop.
    pub async fn listen(&self, address: impl ToSocketAddrs) -> Result<()> {
        let listener = TcpListener::bind(address).await?;
        loop {
            let (socket, peer_addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(error) => {
                    tracing::warn!(%error, "accept failed");
                    continue;
                }
            };
            let switch = self.clone();
            tokio::spawn(async move {
                if let Err(error) = switch.accept_one(socket, peer_addr).await {
                    tracing::debug!(%peer_addr, %error, "inbound handshake/registration failed");
                }
            });
        }
    }

    async fn accept_one(&self, socket: TcpStream, peer_addr: SocketAddr) -> Result<()> {
        let max_frame_size = self.inner.options.max_frame_size;
        let (channel, remote_peer_id) =
            responder_handshake(socket, &self.inner.identity, max_frame_size).await?;
        tracing::debug!(%peer_addr, %remote_peer_id, "responder handshake complete");
        self.register_and_run(channel, remote_peer_id, false).await
    }

    /// Dial `address`, run the initiator handshake, and register the
    /// resulting connection. Returns the authenticated remote PeerID.
    pub async fn connect(&self, address: impl ToSocketAddrs) -> Result<PeerId> {
        let socket = TcpStream::connect(address).await?;
        let max_frame_size = self.inner.options.max_frame_size;
        let (channel, remote_peer_id) =
            initiator_handshake(socket, &self.inner.identity, max_frame_size).await?;
        tracing::debug!(%remote_peer_id, "initiator handshake complete");
        self.register_and_run(channel, remote_peer_id, true).await?;
        Ok(remote_peer_id)
    }

    async fn register_and_run(
        &self,
        channel: SecureChannel<TcpStream>,
        remote_peer_id: PeerId,
        initiator: bool,
    ) -> Result<()> {
        if !initiator {
            let gate = self.inner.on_incoming.lock().unwrap().clone();
            if let Some(gate) = gate {
                if let Err(reason) = gate(remote_peer_id) {
                    return Err(Error::admission(reason));
                }
            }
        }

        let (connection, reader) = Connection::new(remote_peer_id, channel);
        self.inner.registry.insert_connection(connection.clone())?;
        tracing::info!(
            connection_id = connection.id(),
            %remote_peer_id,
            initiator,
            "connection registered"
        );

        let switch = self.clone();
        tokio::spawn(async move {
            switch.run_read_loop(connection, reader).await;
        });
        Ok(())
    }

    /// Close every connection registered to `peer_id` and drop it from the
    /// registry. Streams on those connections observe closure the same way
    /// any other connection teardown reports it (§9: one mechanism, one
    /// observable outcome).
    pub async fn disconnect(&self, peer_id: PeerId) {
        let connections = self.inner.registry.remove_all_connections_for_peer(peer_id);
        for connection in connections {
            connection.close().await;
        }
    }

    /// Open a fresh stream to `peer_id` over one of its existing connections,
    /// chosen uniformly at random. No wire message is sent here — the first
    /// `write` on the returned stream materialises it on the peer.
    pub async fn open_stream(
        &self,
        protocol: impl Into<String>,
        peer_id: PeerId,
    ) -> Result<Arc<Stream<TcpStream>>> {
        let connection = self.inner.registry.pick_connection(peer_id)?;
        let stream_id = StreamId::generate()?;
        let (stream, _sender) = self.create_stream(connection, protocol.into(), stream_id);
        Ok(stream)
    }

    fn create_stream(
        &self,
        connection: Arc<Connection<TcpStream>>,
        protocol: String,
        stream_id: StreamId,
    ) -> (Arc<Stream<TcpStream>>, tokio::sync::mpsc::Sender<Vec<u8>>) {
        let connection_id = connection.id();
        let own_peer_id = self.inner.identity.peer_id();
        let switch = self.clone();
        let cleanup: Box<dyn Fn() + Send + Sync> = Box::new(move || {
            switch.inner.registry.remove_stream(connection_id, stream_id);
        });
        let (stream, sender) = Stream::new(
            connection,
            protocol,
            stream_id,
            own_peer_id,
            self.inner.options.receive_queue_capacity,
            self.inner.options.stream_max_inactive,
            cleanup,
        );
        self.inner
            .registry
            .insert_stream(connection_id, stream_id, stream.clone());
        (stream, sender)
    }

    /// One connection's read loop: reads envelopes until the connection dies,
    /// routing each to its stream. On exit, tears down the transport and
    /// removes the connection (and every stream still scoped to it) from the
    /// registry.
    async fn run_read_loop(&self, connection: Arc<Connection<TcpStream>>, mut reader: SecureReader<ReadHalf<TcpStream>>) {
        let peer_id = connection.remote_peer_id();
        let connection_id = connection.id();
        let idle = self.inner.options.connection_max_inactive;

        loop {
            let read_result = if idle.is_zero() {
                reader.read().await
            } else {
                match tokio::time::timeout(idle, reader.read()).await {
                    Ok(result) => result,
                    Err(_elapsed) => Err(Error::Timeout),
                }
            };

            let envelope = match read_result {
                Ok(envelope) => envelope,
                Err(error) => {
                    tracing::debug!(connection_id, %peer_id, %error, "read loop terminating");
                    break;
                }
            };

            if let Err(error) = self.route_envelope(&connection, envelope).await {
                tracing::warn!(connection_id, %peer_id, %error, "fatal routing error, closing connection");
                break;
            }
        }

        connection.close().await;
        self.inner.registry.remove_connection(peer_id, connection_id);
    }

    /// Look up or implicitly create the stream a just-read envelope belongs
    /// to, dispatch a handler if this is its first sighting, and enqueue the
    /// payload. Returns `Err` only for the fatal, connection-ending case: the
    /// receive queue is full.
    async fn route_envelope(&self, connection: &Arc<Connection<TcpStream>>, envelope: crate::envelope::Envelope) -> Result<()> {
        let connection_id = connection.id();
        let stream_id = envelope.stream_id;

        let (stream, is_new) = match self.inner.registry.lookup_stream(connection_id, stream_id) {
            Some(stream) => (stream, false),
            None => {
                let (stream, _sender) = self.create_stream(connection.clone(), envelope.protocol.clone(), stream_id);
                (stream, true)
            }
        };

        if envelope.is_close() {
            stream.mark_peer_closed();
            return Ok(());
        }

        if is_new {
            let handler = self.inner.protocols.lock().unwrap().get(&envelope.protocol).cloned();
            if let Some(handler) = handler {
                tracing::debug!(connection_id, protocol = %envelope.protocol, "dispatching protocol handler");
                tokio::spawn(handler(stream.clone()));
            }
        }

        stream
            .try_enqueue(envelope.data)
            .map_err(|_| Error::ReceiveQueueFull)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn options_with(max_connections_per_peer: usize) -> Options {
        Options {
            stream_max_inactive: Duration::ZERO,
            connection_max_inactive: Duration::ZERO,
            max_connections_per_peer,
            ..Options::default()
        }
    }

    async fn bound_switch(options: Options) -> (Switch, SocketAddr) {
        let identity = Keypair::generate().unwrap();
        let switch = Switch::new(identity, options);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepting = switch.clone();
        tokio::spawn(async move {
            loop {
                let (socket, peer_addr) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => return,
                };
                let switch = accepting.clone();
                tokio::spawn(async move {
                    let _ = switch.accept_one(socket, peer_addr).await;
                });
            }
        });
        (switch, addr)
    }

    #[tokio::test]
    async fn echo_round_trip() {
        let (server, addr) = bound_switch(options_with(0)).await;
        server.add_protocol("echo", |stream| {
            Box::pin(async move {
                if let Ok(payload) = stream.read().await {
                    let _ = stream.write(payload).await;
                }
            })
        });

        let client = Switch::new(Keypair::generate().unwrap(), options_with(0));
        let server_peer_id = client.connect(addr).await.unwrap();

        let stream = client.open_stream("echo", server_peer_id).await.unwrap();
        stream.write(b"hello".to_vec()).await.unwrap();
        let echoed = stream.read().await.unwrap();
        assert_eq!(echoed, b"hello");
    }

    #[tokio::test]
    async fn three_message_reply_arrives_in_order() {
        let (server, addr) = bound_switch(options_with(0)).await;
        server.add_protocol("t", |stream| {
            Box::pin(async move {
                let _ = stream.write(b"A".to_vec()).await;
                let _ = stream.write(b"B".to_vec()).await;
                let _ = stream.write(b"C".to_vec()).await;
            })
        });

        let client = Switch::new(Keypair::generate().unwrap(), options_with(0));
        let server_peer_id = client.connect(addr).await.unwrap();
        let stream = client.open_stream("t", server_peer_id).await.unwrap();

        assert_eq!(stream.read().await.unwrap(), b"A");
        assert_eq!(stream.read().await.unwrap(), b"B");
        assert_eq!(stream.read().await.unwrap(), b"C");
    }

    #[tokio::test]
    async fn peer_close_is_observed_after_buffered_data() {
        let (server, addr) = bound_switch(options_with(0)).await;
        let observed_ping = Arc::new(tokio::sync::Notify::new());
        let observed_close = Arc::new(tokio::sync::Notify::new());
        let observed_for_handler = observed_ping.clone();
        let observed_close_for_handler = observed_close.clone();
        server.add_protocol("t", move |stream| {
            let observed = observed_for_handler.clone();
            let observed_close = observed_close_for_handler.clone();
            Box::pin(async move {
                let payload = stream.read().await.unwrap();
                assert_eq!(payload, b"ping");
                observed.notify_one();
                let err = stream.read().await.unwrap_err();
                assert!(matches!(err, Error::StreamClosed(crate::stream::ClosedReason::Peer)));
                observed_close.notify_one();
            })
        });

        let client = Switch::new(Keypair::generate().unwrap(), options_with(0));
        let server_peer_id = client.connect(addr).await.unwrap();
        let stream = client.open_stream("t", server_peer_id).await.unwrap();
        stream.write(b"ping".to_vec()).await.unwrap();
        stream.close().await.unwrap();
        observed_ping.notified().await;

        tokio::time::timeout(Duration::from_secs(1), observed_close.notified())
            .await
            .expect("handler should observe StreamClosed::Peer after the buffered ping");
    }

    #[tokio::test]
    async fn disconnect_closes_every_stream_on_the_peer() {
        let (server, addr) = bound_switch(options_with(0)).await;
        server.add_protocol("hold", |stream| {
            Box::pin(async move {
                let _ = stream.read().await;
            })
        });

        let client = Switch::new(Keypair::generate().unwrap(), options_with(0));
        let server_peer_id = client.connect(addr).await.unwrap();
        let stream = client.open_stream("hold", server_peer_id).await.unwrap();
        stream.write(b"ping".to_vec()).await.unwrap();

        client.disconnect(server_peer_id).await;

        let err = stream.read().await.unwrap_err();
        assert!(matches!(err, Error::StreamClosed(crate::stream::ClosedReason::Local)));
    }
}
