//! The connection registry and stream table, both protected by a single
//! `std::sync::Mutex` per the one-critical-section invariant: a connection's
//! admission and a stream's registration must never be observed out of step
//! with each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use conduit_crypto::PeerId;
use rand::Rng;

use crate::connection::{Connection, ConnectionId};
use crate::envelope::StreamId;
use crate::error::{Error, Result};
use crate::stream::Stream;

struct Inner<T> {
    peers: HashMap<PeerId, Vec<Arc<Connection<T>>>>,
    streams: HashMap<(ConnectionId, StreamId), Arc<Stream<T>>>,
}

pub struct Registry<T> {
    max_connections_per_peer: usize,
    inner: Mutex<Inner<T>>,
}

impl<T> Registry<T> {
    #[must_use]
    pub fn new(max_connections_per_peer: usize) -> Self {
        Self {
            max_connections_per_peer,
            inner: Mutex::new(Inner {
                peers: HashMap::new(),
                streams: HashMap::new(),
            }),
        }
    }

    /// Register a newly handshaked connection. Capacity enforcement is atomic
    /// with insertion: both happen under the same critical section.
    pub fn insert_connection(&self, connection: Arc<Connection<T>>) -> Result<()> {
        let peer_id = connection.remote_peer_id();
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.peers.entry(peer_id).or_default();
        if self.max_connections_per_peer != 0 && entry.len() >= self.max_connections_per_peer {
            return Err(Error::MaxConnectionsPerPeer);
        }
        entry.push(connection);
        Ok(())
    }

    /// Drop one connection's registration and flip every stream still scoped
    /// to it to locally closed. Used by the read loop's own teardown path, a
    /// `disconnect()` call, and idle-timeout expiry alike (§9: one mechanism,
    /// one observable outcome).
    pub fn remove_connection(&self, peer_id: PeerId, connection_id: ConnectionId) {
        let mut inner = self.inner.lock().unwrap();
        Self::remove_connection_locked(&mut inner, peer_id, connection_id);
    }

    /// Drop every connection registered for a peer (used by `disconnect`).
    /// Returns the removed connections so the caller can close their
    /// transports outside the lock.
    pub fn remove_all_connections_for_peer(&self, peer_id: PeerId) -> Vec<Arc<Connection<T>>> {
        let mut inner = self.inner.lock().unwrap();
        let Some(connection_ids) = inner.peers.get(&peer_id).map(|conns| conns.iter().map(|c| c.id()).collect::<Vec<_>>()) else {
            return Vec::new();
        };
        let mut removed = Vec::with_capacity(connection_ids.len());
        for connection_id in connection_ids {
            if let Some(connection) = Self::remove_connection_locked(&mut inner, peer_id, connection_id) {
                removed.push(connection);
            }
        }
        removed
    }

    fn remove_connection_locked(inner: &mut Inner<T>, peer_id: PeerId, connection_id: ConnectionId) -> Option<Arc<Connection<T>>> {
        let mut removed = None;
        if let Some(conns) = inner.peers.get_mut(&peer_id) {
            if let Some(pos) = conns.iter().position(|c| c.id() == connection_id) {
                removed = Some(conns.remove(pos));
            }
            if conns.is_empty() {
                inner.peers.remove(&peer_id);
            }
        }
        let stale: Vec<_> = inner
            .streams
            .keys()
            .filter(|(cid, _)| *cid == connection_id)
            .copied()
            .collect();
        for key in stale {
            if let Some(stream) = inner.streams.remove(&key) {
                stream.mark_locally_closed();
            }
        }
        removed
    }

    /// Pick one of the peer's connections uniformly at random.
    pub fn pick_connection(&self, peer_id: PeerId) -> Result<Arc<Connection<T>>> {
        let inner = self.inner.lock().unwrap();
        let conns = inner.peers.get(&peer_id).filter(|c| !c.is_empty()).ok_or(Error::NoConnection)?;
        let idx = rand::thread_rng().gen_range(0..conns.len());
        Ok(conns[idx].clone())
    }

    #[must_use]
    pub fn connection_count(&self, peer_id: PeerId) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.peers.get(&peer_id).map_or(0, Vec::len)
    }

    pub fn insert_stream(&self, connection_id: ConnectionId, stream_id: StreamId, stream: Arc<Stream<T>>) {
        let mut inner = self.inner.lock().unwrap();
        inner.streams.insert((connection_id, stream_id), stream);
    }

    #[must_use]
    pub fn lookup_stream(&self, connection_id: ConnectionId, stream_id: StreamId) -> Option<Arc<Stream<T>>> {
        let inner = self.inner.lock().unwrap();
        inner.streams.get(&(connection_id, stream_id)).cloned()
    }

    pub fn remove_stream(&self, connection_id: ConnectionId, stream_id: StreamId) {
        let mut inner = self.inner.lock().unwrap();
        inner.streams.remove(&(connection_id, stream_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::tests::test_connection;

    #[test]
    fn rejects_the_nth_plus_one_connection() {
        let registry: Registry<tokio::io::DuplexStream> = Registry::new(1);
        let peer_id = PeerId::from_public_bytes(b"remote");

        let first = test_connection();
        assert_eq!(first.remote_peer_id(), peer_id);
        registry.insert_connection(first).unwrap();

        let second = test_connection();
        let err = registry.insert_connection(second).unwrap_err();
        assert!(matches!(err, Error::MaxConnectionsPerPeer));
        assert_eq!(registry.connection_count(peer_id), 1);
    }

    #[test]
    fn zero_cap_means_unlimited() {
        let registry: Registry<tokio::io::DuplexStream> = Registry::new(0);
        let peer_id = PeerId::from_public_bytes(b"remote");
        for _ in 0..5 {
            registry.insert_connection(test_connection()).unwrap();
        }
        assert_eq!(registry.connection_count(peer_id), 5);
    }

    #[test]
    fn pick_connection_fails_with_no_connection_for_unknown_peer() {
        let registry: Registry<tokio::io::DuplexStream> = Registry::new(3);
        let err = registry.pick_connection(PeerId::from_public_bytes(b"nobody")).unwrap_err();
        assert!(matches!(err, Error::NoConnection));
    }

    #[tokio::test]
    async fn removing_a_connection_drops_its_streams_and_peer_entry() {
        let registry: Registry<tokio::io::DuplexStream> = Registry::new(0);
        let peer_id = PeerId::from_public_bytes(b"remote");
        let connection = test_connection();
        let connection_id = connection.id();
        registry.insert_connection(connection).unwrap();

        let (stream, _tx) = crate::stream::Stream::new(
            test_connection(),
            "echo".to_string(),
            StreamId::generate().unwrap(),
            peer_id,
            8,
            std::time::Duration::ZERO,
            Box::new(|| {}),
        );
        let stream_id = stream.stream_id();
        registry.insert_stream(connection_id, stream_id, stream.clone());
        assert!(registry.lookup_stream(connection_id, stream_id).is_some());

        registry.remove_connection(peer_id, connection_id);
        assert_eq!(registry.connection_count(peer_id), 0);
        assert!(registry.lookup_stream(connection_id, stream_id).is_none());

        let err = stream.write(b"too late".to_vec()).await.unwrap_err();
        assert!(matches!(err, Error::StreamClosed(crate::stream::ClosedReason::Local)));
    }
}
