//! Property-based tests: framing round-trip and envelope encode/decode over
//! arbitrary protocol strings, stream ids, and payload bytes (§8 property 4).

use conduit_core::envelope::{Envelope, PeerIdWire, Status, StreamId};
use conduit_core::framing::{DEFAULT_MAX_FRAME_SIZE, read_frame, write_frame};
use conduit_crypto::PeerId;
use proptest::prelude::*;

fn arbitrary_status() -> impl Strategy<Value = Status> {
    prop_oneof![Just(Status::Ok), Just(Status::Close)]
}

fn arbitrary_envelope() -> impl Strategy<Value = Envelope> {
    (
        "[a-zA-Z0-9/._-]{1,64}",
        any::<[u8; 16]>(),
        any::<[u8; 32]>(),
        arbitrary_status(),
        proptest::collection::vec(any::<u8>(), 0..256),
    )
        .prop_map(|(protocol, stream_bytes, peer_bytes, status, data)| Envelope {
            protocol,
            stream_id: StreamId::new(stream_bytes),
            peer_id: PeerIdWire(PeerId::from_public_bytes(&peer_bytes)),
            status,
            data,
        })
}

proptest! {
    #[test]
    fn envelope_json_round_trips(envelope in arbitrary_envelope()) {
        let json = serde_json::to_vec(&envelope).unwrap();
        let back: Envelope = serde_json::from_slice(&json).unwrap();
        prop_assert_eq!(envelope, back);
    }

    #[test]
    fn framing_round_trips_arbitrary_payloads(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let mut buf = Vec::new();
            write_frame(&mut buf, &payload).await.unwrap();
            let mut cursor = std::io::Cursor::new(buf);
            let read_back = read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE).await.unwrap();
            prop_assert_eq!(payload, read_back);
            Ok(())
        })?;
    }

    #[test]
    fn envelope_through_framing_round_trips(envelope in arbitrary_envelope()) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let marshalled = serde_json::to_vec(&envelope).unwrap();
            let mut buf = Vec::new();
            write_frame(&mut buf, &marshalled).await.unwrap();
            let mut cursor = std::io::Cursor::new(buf);
            let framed_payload = read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE).await.unwrap();
            let unmarshalled: Envelope = serde_json::from_slice(&framed_payload).unwrap();
            prop_assert_eq!(envelope, unmarshalled);
            Ok(())
        })?;
    }
}
