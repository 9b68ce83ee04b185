//! The per-peer ordered, reliable byte channel the engine is built on top
//! of. Binary frames and JSON control messages share the same channel; the
//! receiving side classifies each inbound message explicitly rather than
//! guessing from its shape.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Errors a `Channel` implementation may surface.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel closed, locally or by the peer.
    #[error("channel closed")]
    Closed,

    /// The underlying transport rejected the send (e.g. socket error).
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// One message received from the channel, already classified. The
/// classification follows the sentinel-byte heuristic: a leading `{` or `[`
/// is a JSON control message, anything else is a binary wire frame.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// A JSON control message payload.
    Text(String),
    /// A binary wire frame payload.
    Binary(Bytes),
}

/// An ordered, reliable, bidirectional byte channel to exactly one peer.
///
/// Implementations must preserve send order and must not silently drop
/// messages: the engine relies on `send`/`recv` behaving like a reliable
/// stream, not a datagram socket.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Send a binary wire frame.
    async fn send_binary(&self, data: &[u8]) -> Result<(), ChannelError>;

    /// Send a JSON control message.
    async fn send_text(&self, data: &str) -> Result<(), ChannelError>;

    /// Receive the next inbound message, or `None` once the channel has
    /// closed and drained.
    async fn recv(&self) -> Option<Inbound>;

    /// Bytes currently queued for send but not yet flushed to the peer.
    /// The congestion controller and fan-out coordinator both read this to
    /// detect backpressure.
    fn buffered_amount(&self) -> u64;
}
