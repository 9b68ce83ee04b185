//! HKDF-SHA256 key derivation (RFC 5869).

use crate::CryptoError;
use hkdf::Hkdf;
use sha2::Sha256;

/// Derive `output.len()` bytes of key material from `ikm` (input keying
/// material, typically an X25519 shared secret) using `salt` and `info`.
///
/// # Errors
///
/// Returns `CryptoError::InvalidKeyLength` if `output` requests more than
/// 255 * 32 bytes, the HKDF-SHA256 expand limit.
pub fn derive(salt: &[u8], ikm: &[u8], info: &[u8], output: &mut [u8]) -> Result<(), CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    hk.expand(info, output)
        .map_err(|_| CryptoError::InvalidKeyLength {
            expected: 255 * 32,
            actual: output.len(),
        })
}

/// Derive the full set of per-direction session keys from a completed
/// X25519 handshake's shared secret.
///
/// `initiator` selects which derived slice becomes the send key: the
/// initiator's send key is the peer's receive key and vice versa, so both
/// sides converge on the same two directional keys.
#[must_use]
pub fn derive_session_keys(shared_secret: &[u8; 32], initiator: bool) -> crate::SessionKeys {
    let mut okm = [0u8; 72];
    derive(b"wraith-warp/handshake", shared_secret, b"session-keys", &mut okm)
        .expect("72-byte expand is well within the HKDF-SHA256 limit");

    let mut a_to_b = [0u8; 32];
    let mut b_to_a = [0u8; 32];
    let mut nonce_prefix = [0u8; 4];
    a_to_b.copy_from_slice(&okm[0..32]);
    b_to_a.copy_from_slice(&okm[32..64]);
    nonce_prefix.copy_from_slice(&okm[64..68]);

    let (send_key, recv_key) = if initiator {
        (a_to_b, b_to_a)
    } else {
        (b_to_a, a_to_b)
    };

    crate::SessionKeys {
        send_key,
        recv_key,
        nonce_prefix,
    }
}
