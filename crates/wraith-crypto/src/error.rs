//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// AEAD seal failed.
    #[error("seal failed")]
    SealFailed,

    /// AEAD open failed (authentication failure). Fatal to the session per
    /// the `AuthFailure` error taxonomy: the receiver must abort.
    #[error("open failed: authentication failure")]
    AuthFailure,

    /// Invalid key length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        actual: usize,
    },

    /// The peer's X25519 public key was a low-order point.
    #[error("handshake key exchange produced a degenerate shared secret")]
    DegenerateSharedSecret,

    /// Sequence counter exhausted; no further frames can be sealed without a
    /// session reset.
    #[error("sequence counter exhausted, session reset required")]
    SequenceOverflow,
}
