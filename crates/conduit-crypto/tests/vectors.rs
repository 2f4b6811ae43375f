//! Known-answer tests pinning the exact derivations the wire protocol depends on.

use conduit_crypto::hash::sha256;
use conduit_crypto::peer_id::PeerId;

#[test]
fn sha256_empty_string_vector() {
    // NIST FIPS 180-4 test vector.
    let digest = sha256(b"");
    assert_eq!(
        hex::encode(digest),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85"
    );
}

#[test]
fn sha256_abc_vector() {
    // FIPS 180-4 test vector.
    let digest = sha256(b"abc");
    assert_eq!(
        hex::encode(digest),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn peer_id_is_sha256_of_public_bytes() {
    let key_bytes = b"a deterministic stand-in for marshalled public key bytes";
    let expected = sha256(key_bytes);
    let peer_id = PeerId::from_public_bytes(key_bytes);
    assert_eq!(peer_id.as_bytes(), &expected);
    assert_eq!(peer_id.to_hex(), hex::encode(expected));
}
