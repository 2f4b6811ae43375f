//! The unit exchanged over any framed channel, handshake or post-handshake.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use conduit_crypto::PeerId;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Reserved protocol name used by the handshake's insecure-channel envelopes.
pub const HELLO_PROTOCOL: &str = "/b2b/hello/1.0.0";

/// A stream's identifier: a random 16-byte value, hex-encoded on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct StreamId([u8; 16]);

impl StreamId {
    #[must_use]
    pub fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh random stream id.
    pub fn generate() -> Result<Self, conduit_crypto::CryptoError> {
        conduit_crypto::random::random_16().map(Self)
    }

    #[must_use]
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for StreamId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for StreamId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("stream id must be 16 bytes"))?;
        Ok(Self(arr))
    }
}

/// Whether the envelope carries ordinary payload or signals stream teardown.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Status {
    Ok = 0,
    Close = 1,
}

/// The message unit exchanged over an insecure or secure framed channel.
///
/// Field names match the wire JSON exactly: `Protocol`, `StreamID`, `PeerID`,
/// `Status`, `Data`.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Envelope {
    pub protocol: String,
    #[serde(rename = "StreamID")]
    pub stream_id: StreamId,
    #[serde(rename = "PeerID")]
    pub peer_id: PeerIdWire,
    pub status: Status,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Wire form of [`PeerId`]: a 64-character hex string, serialised through the
/// same hex encoding `PeerId`'s `Display`/`FromStr` use.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PeerIdWire(pub PeerId);

impl Serialize for PeerIdWire {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_hex())
    }
}

impl<'de> Deserialize<'de> for PeerIdWire {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<PeerId>()
            .map(PeerIdWire)
            .map_err(serde::de::Error::custom)
    }
}

impl From<PeerId> for PeerIdWire {
    fn from(id: PeerId) -> Self {
        Self(id)
    }
}

mod base64_bytes {
    use super::{BASE64, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        BASE64.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

impl Envelope {
    #[must_use]
    pub fn is_close(&self) -> bool {
        matches!(self.status, Status::Close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope {
            protocol: "echo".to_string(),
            stream_id: StreamId::generate().unwrap(),
            peer_id: PeerIdWire(PeerId::from_public_bytes(b"test key")),
            status: Status::Ok,
            data: b"hello".to_vec(),
        }
    }

    #[test]
    fn json_round_trip() {
        let env = sample();
        let json = serde_json::to_vec(&env).unwrap();
        let back: Envelope = serde_json::from_slice(&json).unwrap();
        assert_eq!(env, back);
    }

    #[test]
    fn wire_field_names_are_pascal_case() {
        let env = sample();
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("\"Protocol\""));
        assert!(json.contains("\"StreamID\""));
        assert!(json.contains("\"PeerID\""));
        assert!(json.contains("\"Status\""));
        assert!(json.contains("\"Data\""));
    }

    #[test]
    fn data_is_base64_on_the_wire() {
        let mut env = sample();
        env.data = vec![0xff, 0x00, 0x10];
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains(&base64::engine::general_purpose::STANDARD.encode([0xff, 0x00, 0x10])));
    }

    #[test]
    fn status_close_round_trips() {
        let mut env = sample();
        env.status = Status::Close;
        let json = serde_json::to_vec(&env).unwrap();
        let back: Envelope = serde_json::from_slice(&json).unwrap();
        assert!(back.is_close());
    }
}
