//! AES-256-GCM frame sealing.
//!
//! Each direction of a session seals frames under its own key with a nonce
//! built from a fixed 4-byte random prefix and the frame's 8-byte big-endian
//! sequence number. Frame headers are never encrypted; they are passed as
//! associated data so tampering with an unencrypted header is still
//! detected by the AEAD tag.

use crate::{CryptoError, SessionKeys};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use std::sync::atomic::{AtomicU64, Ordering};
use zeroize::ZeroizeOnDrop;

fn build_nonce(prefix: &[u8; 4], sequence: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[..4].copy_from_slice(prefix);
    nonce[4..].copy_from_slice(&sequence.to_be_bytes());
    nonce
}

/// Largest sequence number a 22-byte frame header can carry. A `seal` call
/// past this point would wrap the wire header's `sequence` field, so it is
/// rejected before it ever reaches the AEAD.
const MAX_SEQUENCE: u64 = u32::MAX as u64;

/// Per-direction AEAD state for one batch's crypto session.
///
/// Holds the two directional keys derived at handshake time and the
/// monotonic sequence counters used to build nonces. A fresh `FrameCrypto`
/// is created for every batch (see the fan-out coordinator), so counters
/// never approach their overflow point in practice.
#[derive(ZeroizeOnDrop)]
pub struct FrameCrypto {
    send_key: [u8; 32],
    recv_key: [u8; 32],
    #[zeroize(skip)]
    send_prefix: [u8; 4],
    #[zeroize(skip)]
    recv_prefix: [u8; 4],
    #[zeroize(skip)]
    total_bytes_encrypted: AtomicU64,
}

impl FrameCrypto {
    /// Build a `FrameCrypto` from session keys derived via [`crate::kdf::derive_session_keys`].
    ///
    /// Both sides of a session derive the same `nonce_prefix`; each side
    /// still seals its own outgoing stream with its own counter, so sender
    /// and receiver never reuse a (key, nonce) pair.
    #[must_use]
    pub fn new(keys: &SessionKeys) -> Self {
        Self {
            send_key: keys.send_key,
            recv_key: keys.recv_key,
            send_prefix: keys.nonce_prefix,
            recv_prefix: keys.nonce_prefix,
            total_bytes_encrypted: AtomicU64::new(0),
        }
    }

    /// Total plaintext bytes sealed by this session since it was created or
    /// last [`FrameCrypto::reset`].
    #[must_use]
    pub fn bytes_encrypted(&self) -> u64 {
        self.total_bytes_encrypted.load(Ordering::Relaxed)
    }

    /// Zero the byte counter for a fresh batch. Sequence numbers are
    /// supplied by the caller per frame rather than tracked here, so this
    /// is the only state a new batch needs to clear.
    pub fn reset(&self) {
        self.total_bytes_encrypted.store(0, Ordering::Relaxed);
    }

    /// Seal `plaintext` for sequence number `sequence`, authenticating
    /// `header` as associated data.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::SequenceOverflow` if `sequence` would not fit
    /// in the wire header's 32-bit sequence field. Returns
    /// `CryptoError::SealFailed` if the underlying AEAD rejects the
    /// operation (only possible with a malformed key, which cannot happen
    /// through this API).
    pub fn seal(
        &self,
        sequence: u64,
        header: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if sequence > MAX_SEQUENCE {
            return Err(CryptoError::SequenceOverflow);
        }
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.send_key));
        let nonce = build_nonce(&self.send_prefix, sequence);
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: header,
                },
            )
            .map_err(|_| CryptoError::SealFailed)?;
        self.total_bytes_encrypted
            .fetch_add(plaintext.len() as u64, Ordering::Relaxed);
        Ok(ciphertext)
    }

    /// Open a sealed frame at sequence number `sequence`, verifying `header`
    /// as associated data.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::AuthFailure` if the tag does not verify. This
    /// is fatal: the caller must abort the receiving session.
    pub fn open(
        &self,
        sequence: u64,
        header: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.recv_key));
        let nonce = build_nonce(&self.recv_prefix, sequence);
        cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: ciphertext,
                    aad: header,
                },
            )
            .map_err(|_| CryptoError::AuthFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::derive_session_keys;

    fn paired() -> (FrameCrypto, FrameCrypto) {
        let shared = [9u8; 32];
        let a = derive_session_keys(&shared, true);
        let b = derive_session_keys(&shared, false);
        (FrameCrypto::new(&a), FrameCrypto::new(&b))
    }

    #[test]
    fn seal_open_roundtrip() {
        let (alice, bob) = paired();
        let header = b"22-byte-header-stand-in";
        let ct = alice.seal(0, header, b"hello").unwrap();
        let pt = bob.open(0, header, &ct).unwrap();
        assert_eq!(pt, b"hello");
    }

    #[test]
    fn tampered_header_is_rejected() {
        let (alice, bob) = paired();
        let ct = alice.seal(3, b"header-a", b"payload").unwrap();
        assert!(matches!(
            bob.open(3, b"header-b", &ct),
            Err(CryptoError::AuthFailure)
        ));
    }

    #[test]
    fn wrong_sequence_is_rejected() {
        let (alice, bob) = paired();
        let ct = alice.seal(5, b"header", b"payload").unwrap();
        assert!(matches!(
            bob.open(6, b"header", &ct),
            Err(CryptoError::AuthFailure)
        ));
    }

    #[test]
    fn corrupted_ciphertext_is_rejected() {
        let (alice, bob) = paired();
        let mut ct = alice.seal(7, b"header", b"payload").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0xFF;
        assert!(matches!(
            bob.open(7, b"header", &ct),
            Err(CryptoError::AuthFailure)
        ));
    }

    #[test]
    fn seal_tracks_total_bytes_encrypted() {
        let (alice, _bob) = paired();
        assert_eq!(alice.bytes_encrypted(), 0);
        alice.seal(0, b"header", b"hello").unwrap();
        alice.seal(1, b"header", b"world!").unwrap();
        assert_eq!(alice.bytes_encrypted(), 5 + 6);
    }

    #[test]
    fn reset_zeros_the_byte_counter() {
        let (alice, _bob) = paired();
        alice.seal(0, b"header", b"hello").unwrap();
        alice.reset();
        assert_eq!(alice.bytes_encrypted(), 0);
    }

    #[test]
    fn sequence_past_u32_max_is_rejected() {
        let (alice, _bob) = paired();
        assert!(matches!(
            alice.seal(u64::from(u32::MAX) + 1, b"header", b"payload"),
            Err(CryptoError::SequenceOverflow)
        ));
    }
}
