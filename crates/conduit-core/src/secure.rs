//! The AEAD-sealed framed channel used for the lifetime of a connection.

use conduit_crypto::SessionKeys;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};

use crate::envelope::Envelope;
use crate::error::{Error, Result};
use crate::framing::{read_frame, write_frame};

/// A length-prefixed, AEAD-sealed envelope channel over any byte transport.
///
/// Idle-timeout bookkeeping lives one layer up, in the connection's read loop
/// (see `connection.rs`): the read loop already owns the only suspension point
/// activity needs to reset, so a separate timer task would just duplicate it.
pub struct SecureChannel<T> {
    transport: T,
    keys: SessionKeys,
    max_frame_size: u64,
}

impl<T> SecureChannel<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(transport: T, keys: SessionKeys, max_frame_size: u64) -> Self {
        Self {
            transport,
            keys,
            max_frame_size,
        }
    }

    pub async fn write(&mut self, envelope: &Envelope) -> Result<()> {
        let plaintext = serde_json::to_vec(envelope)
            .map_err(|e| Error::framing_owned(format!("envelope marshal failed: {e}")))?;
        let sealed = self.keys.seal(&plaintext)?;
        write_frame(&mut self.transport, &sealed).await
    }

    pub async fn read(&mut self) -> Result<Envelope> {
        let sealed = read_frame(&mut self.transport, self.max_frame_size).await?;
        let plaintext = self.keys.open(&sealed)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| Error::framing_owned(format!("envelope unmarshal failed: {e}")))
    }

    /// Split into an owned read half and an owned write half sharing the same
    /// directional keys, so a connection can run its read loop and its
    /// serialised writer concurrently over one transport.
    pub fn into_split(self) -> (SecureReader<ReadHalf<T>>, SecureWriter<WriteHalf<T>>)
    where
        T: 'static,
    {
        let keys = std::sync::Arc::new(self.keys);
        let (read_half, write_half) = tokio::io::split(self.transport);
        (
            SecureReader {
                transport: read_half,
                keys: keys.clone(),
                max_frame_size: self.max_frame_size,
            },
            SecureWriter {
                transport: write_half,
                keys,
            },
        )
    }
}

/// The read half produced by [`SecureChannel::into_split`].
pub struct SecureReader<R> {
    transport: R,
    keys: std::sync::Arc<SessionKeys>,
    max_frame_size: u64,
}

impl<R: AsyncRead + Unpin> SecureReader<R> {
    pub async fn read(&mut self) -> Result<Envelope> {
        let sealed = read_frame(&mut self.transport, self.max_frame_size).await?;
        let plaintext = self.keys.open(&sealed)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| Error::framing_owned(format!("envelope unmarshal failed: {e}")))
    }
}

/// The write half produced by [`SecureChannel::into_split`]. Callers are
/// expected to serialise access (e.g. behind a `tokio::sync::Mutex`); nothing
/// here enforces that on its own.
pub struct SecureWriter<W> {
    transport: W,
    keys: std::sync::Arc<SessionKeys>,
}

impl<W: AsyncWrite + Unpin> SecureWriter<W> {
    pub async fn write(&mut self, envelope: &Envelope) -> Result<()> {
        let plaintext = serde_json::to_vec(envelope)
            .map_err(|e| Error::framing_owned(format!("envelope marshal failed: {e}")))?;
        let sealed = self.keys.seal(&plaintext)?;
        write_frame(&mut self.transport, &sealed).await
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        self.transport.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{PeerIdWire, Status, StreamId};
    use conduit_crypto::PeerId;

    fn channel_pair() -> (SecureChannel<tokio::io::DuplexStream>, SecureChannel<tokio::io::DuplexStream>) {
        let secret = [42u8; 32];
        let (a, b) = tokio::io::duplex(8192);
        let initiator = SecureChannel::new(a, SessionKeys::derive(&secret, true).unwrap(), 16 * 1024 * 1024);
        let responder = SecureChannel::new(b, SessionKeys::derive(&secret, false).unwrap(), 16 * 1024 * 1024);
        (initiator, responder)
    }

    fn sample_envelope(data: &[u8]) -> Envelope {
        Envelope {
            protocol: "echo".to_string(),
            stream_id: StreamId::generate().unwrap(),
            peer_id: PeerIdWire(PeerId::from_public_bytes(b"key")),
            status: Status::Ok,
            data: data.to_vec(),
        }
    }

    #[tokio::test]
    async fn writes_then_reads_decrypted_envelope() {
        let (mut initiator, mut responder) = channel_pair();
        let env = sample_envelope(b"hello");
        initiator.write(&env).await.unwrap();
        let received = responder.read().await.unwrap();
        assert_eq!(env, received);
    }

    #[tokio::test]
    async fn responder_can_write_back() {
        let (mut initiator, mut responder) = channel_pair();
        let env = sample_envelope(b"reply");
        responder.write(&env).await.unwrap();
        let received = initiator.read().await.unwrap();
        assert_eq!(env, received);
    }

    #[tokio::test]
    async fn wrong_keys_fail_to_decrypt() {
        let (mut initiator, b) = channel_pair();
        let mut eavesdropper = SecureChannel::new(b.transport, SessionKeys::derive(&[0u8; 32], false).unwrap(), 16 * 1024 * 1024);
        initiator.write(&sample_envelope(b"secret")).await.unwrap();
        assert!(eavesdropper.read().await.is_err());
    }

    #[tokio::test]
    async fn split_halves_can_read_and_write_concurrently() {
        let (initiator, responder) = channel_pair();
        let (_initiator_reader, mut initiator_writer) = initiator.into_split();
        let (mut responder_reader, _responder_writer) = responder.into_split();

        let env = sample_envelope(b"split");
        initiator_writer.write(&env).await.unwrap();
        let received = responder_reader.read().await.unwrap();
        assert_eq!(env, received);
    }
}
