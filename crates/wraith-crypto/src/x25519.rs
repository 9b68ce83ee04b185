//! One-round X25519 key agreement for a transfer session handshake.
//!
//! Each side of a session generates an ephemeral [`PrivateKey`], exchanges
//! [`PublicKey`]s out of band (over whatever `Signaling` implementation the
//! host application supplies), and calls [`PrivateKey::exchange`] once to
//! get a [`SharedSecret`]. The secret is never used directly as a cipher
//! key — it only ever flows into [`crate::kdf::derive_session_keys`].

use rand_core::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// X25519 private key (32 bytes).
#[derive(Clone, ZeroizeOnDrop, Zeroize)]
pub struct PrivateKey(x25519_dalek::StaticSecret);

/// X25519 public key (32 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey(x25519_dalek::PublicKey);

/// X25519 shared secret (32 bytes), pre-KDF.
#[derive(ZeroizeOnDrop, Zeroize)]
pub struct SharedSecret(x25519_dalek::SharedSecret);

impl PrivateKey {
    /// Generate a fresh private key for one handshake, with RFC 7748
    /// clamping applied by the underlying curve implementation.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(x25519_dalek::StaticSecret::random_from_rng(rng))
    }

    /// Derive this key's public half, to hand to the peer over signaling.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey(x25519_dalek::PublicKey::from(&self.0))
    }

    /// Run the one-round Diffie-Hellman exchange against a peer's public
    /// key.
    ///
    /// Returns `None` if `peer_public` is a low-order point — a peer
    /// offering one either sent a corrupted key or is attempting to force a
    /// predictable shared secret, and the handshake must be aborted either
    /// way.
    #[must_use]
    pub fn exchange(&self, peer_public: &PublicKey) -> Option<SharedSecret> {
        let shared = self.0.diffie_hellman(&peer_public.0);
        if shared.as_bytes() == &[0u8; 32] {
            return None;
        }
        Some(SharedSecret(shared))
    }

    /// Export the raw key bytes, e.g. for `warp keygen` to write to disk.
    ///
    /// # Security
    ///
    /// The returned bytes are the raw private scalar. The caller is
    /// responsible for how they're stored.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Load a private key previously exported with [`PrivateKey::to_bytes`].
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(x25519_dalek::StaticSecret::from(bytes))
    }
}

impl PublicKey {
    /// Serialize for transmission to the peer.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        *self.0.as_bytes()
    }

    /// Parse a public key received from the peer over signaling.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(x25519_dalek::PublicKey::from(bytes))
    }

    /// Borrow the raw bytes without copying.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl SharedSecret {
    /// Borrow the raw shared secret bytes.
    ///
    /// # Security
    ///
    /// Must be passed through [`crate::kdf::derive_session_keys`] before use
    /// as an encryption key; a session never seals frames with this value
    /// directly.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    #[test]
    fn generated_public_key_is_not_degenerate() {
        let private = PrivateKey::generate(&mut OsRng);
        assert_ne!(private.public_key().to_bytes(), [0u8; 32]);
    }

    #[test]
    fn both_sides_of_a_handshake_agree_on_the_shared_secret() {
        let initiator = PrivateKey::generate(&mut OsRng);
        let responder = PrivateKey::generate(&mut OsRng);

        let from_initiator = initiator.exchange(&responder.public_key()).unwrap();
        let from_responder = responder.exchange(&initiator.public_key()).unwrap();

        assert_eq!(from_initiator.as_bytes(), from_responder.as_bytes());
    }

    #[test]
    fn a_degenerate_peer_key_aborts_the_handshake() {
        let private = PrivateKey::generate(&mut OsRng);
        let zero_public = PublicKey::from_bytes([0u8; 32]);
        assert!(private.exchange(&zero_public).is_none());
    }

    #[test]
    fn keygen_roundtrip_preserves_the_public_half() {
        // warp keygen writes `to_bytes()` to disk and reconstructs the key
        // from it on the next run; the public key it advertises must not
        // change.
        let original = PrivateKey::generate(&mut OsRng);
        let restored = PrivateKey::from_bytes(original.to_bytes());
        assert_eq!(
            original.public_key().to_bytes(),
            restored.public_key().to_bytes()
        );
    }

    // RFC 7748 §5.2 test vector 1. Bypasses `generate()`'s clamping via
    // `from_bytes` so the known-answer scalar and basepoint are used as-is;
    // this is a cross-implementation correctness check against the curve
    // library, not a test of this module's own (thin) wrapper logic.
    #[test]
    fn rfc7748_known_answer_vector() {
        let scalar = [
            0xa5, 0x46, 0xe3, 0x6b, 0xf0, 0x52, 0x7c, 0x9d, 0x3b, 0x16, 0x15, 0x4b, 0x82, 0x46,
            0x5e, 0xdd, 0x62, 0x14, 0x4c, 0x0a, 0xc1, 0xfc, 0x5a, 0x18, 0x50, 0x6a, 0x22, 0x44,
            0xba, 0x44, 0x9a, 0xc4,
        ];
        let basepoint = [
            0xe6, 0xdb, 0x68, 0x67, 0x58, 0x30, 0x30, 0xdb, 0x35, 0x94, 0xc1, 0xa4, 0x24, 0xb1,
            0x5f, 0x7c, 0x72, 0x66, 0x24, 0xec, 0x26, 0xb3, 0x35, 0x3b, 0x10, 0xa9, 0x03, 0xa6,
            0xd0, 0xab, 0x1c, 0x4c,
        ];
        let expected = [
            0xc3, 0xda, 0x55, 0x37, 0x9d, 0xe9, 0xc6, 0x90, 0x8e, 0x94, 0xea, 0x4d, 0xf2, 0x8d,
            0x08, 0x4f, 0x32, 0xec, 0xcf, 0x03, 0x49, 0x1c, 0x71, 0xf7, 0x54, 0xb4, 0x07, 0x55,
            0x77, 0xa2, 0x85, 0x52,
        ];

        let private = PrivateKey::from_bytes(scalar);
        let public = PublicKey::from_bytes(basepoint);
        let shared = private.exchange(&public).unwrap();

        assert_eq!(shared.as_bytes(), &expected);
    }
}
