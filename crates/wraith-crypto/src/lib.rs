//! # wraith-warp crypto
//!
//! Cryptographic primitives for a transfer session: a one-round X25519
//! handshake, HKDF-SHA256 key derivation, and AES-256-GCM per-frame sealing.
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Security Level |
//! |----------|-----------|----------------|
//! | Key Exchange | X25519 | 128-bit |
//! | KDF | HKDF-SHA256 | 128-bit |
//! | AEAD | AES-256-GCM | 256-bit key |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod aead;
pub mod error;
pub mod kdf;
pub mod x25519;

pub use error::CryptoError;

/// X25519 public key size
pub const X25519_PUBLIC_KEY_SIZE: usize = 32;

/// X25519 secret key size
pub const X25519_SECRET_KEY_SIZE: usize = 32;

/// AES-256-GCM key size
pub const AES_KEY_SIZE: usize = 32;

/// AES-256-GCM nonce size
pub const AES_NONCE_SIZE: usize = 12;

/// Session keys derived from the handshake: one direction per peer.
#[derive(zeroize::Zeroize, zeroize::ZeroizeOnDrop)]
pub struct SessionKeys {
    /// Key for sealing frames sent to the peer.
    pub send_key: [u8; 32],
    /// Key for opening frames received from the peer.
    pub recv_key: [u8; 32],
    /// Random 4-byte prefix mixed into every nonce for this direction.
    #[zeroize(skip)]
    pub nonce_prefix: [u8; 4],
}

impl SessionKeys {
    /// Derive a short connection id from the send key, for log correlation only.
    #[must_use]
    pub fn derive_connection_id(&self) -> [u8; 8] {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(self.send_key);
        let mut cid = [0u8; 8];
        cid.copy_from_slice(&digest[..8]);
        cid
    }
}
