use wraith_crypto::kdf::derive_session_keys;
use wraith_crypto::x25519::PrivateKey;
use zeroize::Zeroize;

#[test]
fn session_keys_are_distinct_per_direction() {
    let shared = [3u8; 32];
    let mut initiator = derive_session_keys(&shared, true);
    let responder = derive_session_keys(&shared, false);
    assert_ne!(initiator.send_key, initiator.recv_key);
    initiator.zeroize();
    assert_eq!(initiator.send_key, [0u8; 32]);
    assert_eq!(initiator.recv_key, [0u8; 32]);
    // responder untouched by initiator's zeroization.
    assert_ne!(responder.send_key, [0u8; 32]);
}

#[test]
fn private_key_export_roundtrips_through_drop() {
    let key = PrivateKey::from_bytes([5u8; 32]);
    let bytes = key.to_bytes();
    drop(key);
    let restored = PrivateKey::from_bytes(bytes);
    assert_eq!(restored.to_bytes(), bytes);
}
