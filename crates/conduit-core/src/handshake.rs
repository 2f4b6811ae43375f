//! The five-step mutually-authenticated handshake that bootstraps a connection.
//!
//! The initiator and responder run the same five steps in a fixed, offset order:
//! the responder's reads are the initiator's writes and vice versa. Both sides
//! finish holding the same 32-byte secret `K`, each having verified a signature
//! over `K` made with the private key matching the other's advertised PeerID.

use std::borrow::Cow;

use conduit_crypto::{CryptoError, Keypair, PeerId, PublicKey, SessionKeys, Signature};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::envelope::{Envelope, HELLO_PROTOCOL, PeerIdWire, Status, StreamId};
use crate::framing::{read_frame, write_frame};
use crate::insecure::InsecureChannel;
use crate::secure::SecureChannel;

/// Failure modes specific to the handshake. None of these leave a registered
/// connection behind — the caller closes the socket and moves on.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("peer's advertised PeerID does not match the hash of its public key")]
    PeerIdMismatch,

    #[error("could not parse or recover peer's key material: {0}")]
    BadKey(Cow<'static, str>),

    #[error("signature over the shared secret did not verify")]
    BadSignature,

    #[error("handshake protocol mismatch: expected {expected:?}, got {got:?}")]
    ProtocolMismatch { expected: &'static str, got: String },

    #[error("transport error during handshake: {0}")]
    Transport(#[from] std::io::Error),
}

impl From<CryptoError> for HandshakeError {
    fn from(e: CryptoError) -> Self {
        Self::BadKey(Cow::Owned(e.to_string()))
    }
}

type Result<T> = std::result::Result<T, HandshakeError>;

fn check_protocol(envelope: &Envelope) -> Result<()> {
    if envelope.protocol != HELLO_PROTOCOL {
        return Err(HandshakeError::ProtocolMismatch {
            expected: HELLO_PROTOCOL,
            got: envelope.protocol.clone(),
        });
    }
    Ok(())
}

fn hello_envelope(stream_id: StreamId, own_peer_id: PeerId, data: Vec<u8>) -> Envelope {
    Envelope {
        protocol: HELLO_PROTOCOL.to_string(),
        stream_id,
        peer_id: PeerIdWire(own_peer_id),
        status: Status::Ok,
        data,
    }
}

/// Parse and self-certify the peer's public key out of a received hello envelope.
fn authenticate_public_key(envelope: &Envelope) -> Result<PublicKey> {
    let claimed = envelope.peer_id.0;
    let recomputed = PeerId::from_public_bytes(&envelope.data);
    if claimed != recomputed {
        return Err(HandshakeError::PeerIdMismatch);
    }
    let public_key = PublicKey::parse(&envelope.data)?;
    Ok(public_key)
}

/// Step 3: wrap `secret` for `peer_public` and send it, asymmetrically encrypted,
/// as a single framed message. This is the "transient secure channel" of the
/// design: one RSA-encrypted message rather than a reusable AEAD session.
async fn send_wrapped_secret<T: AsyncWrite + Unpin>(
    transport: &mut T,
    peer_public: &PublicKey,
    own_peer_id: PeerId,
    stream_id: StreamId,
    secret: &[u8; 32],
) -> Result<()> {
    let envelope = hello_envelope(stream_id, own_peer_id, secret.to_vec());
    let plaintext = serde_json::to_vec(&envelope)
        .map_err(|e| HandshakeError::BadKey(Cow::Owned(e.to_string())))?;
    let wrapped = peer_public.encrypt(&plaintext)?;
    write_frame(transport, &wrapped).await.map_err(|_| {
        HandshakeError::Transport(std::io::Error::other("failed to write wrapped secret"))
    })
}

/// Step 3 mirror: receive and asymmetrically decrypt the peer's wrapped secret.
async fn recv_wrapped_secret<T: AsyncRead + Unpin>(
    transport: &mut T,
    own: &Keypair,
    max_frame_size: u64,
) -> Result<[u8; 32]> {
    let wrapped = read_frame(transport, max_frame_size)
        .await
        .map_err(|_| HandshakeError::Transport(std::io::Error::other("failed to read wrapped secret")))?;
    let plaintext = own.decrypt(&wrapped)?;
    let envelope: Envelope = serde_json::from_slice(&plaintext)
        .map_err(|e| HandshakeError::BadKey(Cow::Owned(e.to_string())))?;
    envelope
        .data
        .try_into()
        .map_err(|_| HandshakeError::BadKey(Cow::Borrowed("wrapped secret was not 32 bytes")))
}

/// Run the handshake as the dialing side. Returns the established secure
/// channel and the authenticated remote PeerID.
pub async fn initiator_handshake<T>(
    transport: T,
    identity: &Keypair,
    max_frame_size: u64,
) -> Result<(SecureChannel<T>, PeerId)>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let stream_id = StreamId::generate().map_err(HandshakeError::from)?;
    let mut insecure = InsecureChannel::new(transport, max_frame_size);

    // Step 1: send our public key.
    insecure
        .write(&hello_envelope(stream_id, identity.peer_id(), identity.public_bytes().to_vec()))
        .await
        .map_err(|_| HandshakeError::Transport(std::io::Error::other("failed to send public key")))?;

    // Step 2: receive and self-certify the peer's public key.
    let peer_hello = insecure
        .read()
        .await
        .map_err(|_| HandshakeError::Transport(std::io::Error::other("failed to read peer public key")))?;
    check_protocol(&peer_hello)?;
    let peer_public = authenticate_public_key(&peer_hello)?;
    let remote_peer_id = peer_hello.peer_id.0;

    let mut transport = insecure.into_inner();

    // Step 3: generate K, send it asymmetrically wrapped for the peer.
    let secret = conduit_crypto::random::random_32().map_err(HandshakeError::from)?;
    send_wrapped_secret(&mut transport, &peer_public, identity.peer_id(), stream_id, &secret).await?;

    let mut insecure = InsecureChannel::new(transport, max_frame_size);

    // Step 4: sign K and send the signature.
    let signature = identity.sign(&secret)?;
    insecure
        .write(&hello_envelope(stream_id, identity.peer_id(), signature.as_bytes().to_vec()))
        .await
        .map_err(|_| HandshakeError::Transport(std::io::Error::other("failed to send signature")))?;

    // Step 5: receive and verify the peer's signature over K.
    let sig_envelope = insecure
        .read()
        .await
        .map_err(|_| HandshakeError::Transport(std::io::Error::other("failed to read peer signature")))?;
    let peer_signature = Signature::from_bytes(sig_envelope.data);
    peer_public
        .verify(&secret, &peer_signature)
        .map_err(|_| HandshakeError::BadSignature)?;

    let transport = insecure.into_inner();
    let keys = SessionKeys::derive(&secret, true)?;
    Ok((SecureChannel::new(transport, keys, max_frame_size), remote_peer_id))
}

/// Run the handshake as the accepting side. Mirrors [`initiator_handshake`] with
/// the reads and writes of steps 1–2 and 4–5 reversed.
pub async fn responder_handshake<T>(
    transport: T,
    identity: &Keypair,
    max_frame_size: u64,
) -> Result<(SecureChannel<T>, PeerId)>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let stream_id = StreamId::generate().map_err(HandshakeError::from)?;
    let mut insecure = InsecureChannel::new(transport, max_frame_size);

    // Step 1 (reversed): receive and self-certify the initiator's public key.
    let peer_hello = insecure
        .read()
        .await
        .map_err(|_| HandshakeError::Transport(std::io::Error::other("failed to read peer public key")))?;
    check_protocol(&peer_hello)?;
    let peer_public = authenticate_public_key(&peer_hello)?;
    let remote_peer_id = peer_hello.peer_id.0;

    // Step 2 (reversed): send our public key.
    insecure
        .write(&hello_envelope(stream_id, identity.peer_id(), identity.public_bytes().to_vec()))
        .await
        .map_err(|_| HandshakeError::Transport(std::io::Error::other("failed to send public key")))?;

    let mut transport = insecure.into_inner();

    // Step 3: receive K, asymmetrically wrapped for us.
    let secret = recv_wrapped_secret(&mut transport, identity, max_frame_size).await?;

    let mut insecure = InsecureChannel::new(transport, max_frame_size);

    // Step 4 (reversed): receive and verify the initiator's signature over K.
    let sig_envelope = insecure
        .read()
        .await
        .map_err(|_| HandshakeError::Transport(std::io::Error::other("failed to read peer signature")))?;
    let peer_signature = Signature::from_bytes(sig_envelope.data);
    peer_public
        .verify(&secret, &peer_signature)
        .map_err(|_| HandshakeError::BadSignature)?;

    // Step 5 (reversed): sign K ourselves and send it.
    let signature = identity.sign(&secret)?;
    insecure
        .write(&hello_envelope(stream_id, identity.peer_id(), signature.as_bytes().to_vec()))
        .await
        .map_err(|_| HandshakeError::Transport(std::io::Error::other("failed to send signature")))?;

    let transport = insecure.into_inner();
    let keys = SessionKeys::derive(&secret, false)?;
    Ok((SecureChannel::new(transport, keys, max_frame_size), remote_peer_id))
}
