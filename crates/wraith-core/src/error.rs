//! Error types for the transfer engine.

use std::time::Duration;
use thiserror::Error;

/// Top-level transfer engine errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Frame parsing error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Crypto session error.
    #[error("crypto error: {0}")]
    Crypto(#[from] wraith_crypto::CryptoError),

    /// Coordinator-level error.
    #[error("coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),
}

/// Frame-level errors.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Frame shorter than the fixed 22-byte header.
    #[error("malformed frame: too short, expected at least {expected}, got {actual}")]
    TooShort {
        /// Expected minimum size.
        expected: usize,
        /// Actual size received.
        actual: usize,
    },

    /// Declared payload length exceeds the bytes actually available.
    #[error("malformed frame: payload length exceeds packet size")]
    PayloadOverflow,

    /// Plaintext-mode CRC32 did not match the header's integrity tag.
    #[error("malformed frame: CRC32 integrity check failed")]
    IntegrityMismatch,
}

/// Errors raised while a batch of peers is being coordinated by the fan-out
/// coordinator.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// A peer attempted to join after `MAX_DIRECT_PEERS` slots were filled
    /// and the queue was also full.
    #[error("peer slot limit reached")]
    SlotLimit,

    /// A peer did not complete its connection handshake within the timeout.
    #[error("peer connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// A received frame failed to parse.
    #[error("malformed frame from peer: {0}")]
    MalformedFrame(#[from] FrameError),

    /// AEAD authentication failed while opening a frame; fatal to the
    /// receiving session.
    #[error("authentication failure opening frame")]
    AuthFailure,

    /// The reorder buffer exceeded its capacity before the gap closed.
    #[error("reorder buffer overflow")]
    ReorderOverflow,

    /// The sink failed to initialize before any frames were accepted.
    #[error("sink initialization failed: {0}")]
    SinkInitFailure(String),

    /// Sending to one peer failed; non-fatal to the batch as a whole.
    #[error("send failure to peer: {0}")]
    SendFailure(String),

    /// The room/session already holds `MAX_DIRECT_PEERS` active peers and
    /// its queue is also full.
    #[error("room full")]
    RoomFull,

    /// The transfer was cancelled by the host.
    #[error("transfer cancelled")]
    Cancelled,
}
