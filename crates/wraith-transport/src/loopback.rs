//! In-memory `Channel` pair for tests and the CLI's loopback demo mode.

use crate::channel::{Channel, ChannelError, Inbound};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// One end of an in-memory channel pair. Created via [`LoopbackChannel::pair`].
pub struct LoopbackChannel {
    tx: mpsc::UnboundedSender<Inbound>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
    buffered: AtomicU64,
}

impl LoopbackChannel {
    /// Create a connected pair: messages sent on one end arrive on the
    /// other's `recv()`.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_b) = mpsc::unbounded_channel();
        let (tx_b, rx_a) = mpsc::unbounded_channel();
        (
            Self {
                tx: tx_a,
                rx: tokio::sync::Mutex::new(rx_a),
                buffered: AtomicU64::new(0),
            },
            Self {
                tx: tx_b,
                rx: tokio::sync::Mutex::new(rx_b),
                buffered: AtomicU64::new(0),
            },
        )
    }
}

#[async_trait]
impl Channel for LoopbackChannel {
    async fn send_binary(&self, data: &[u8]) -> Result<(), ChannelError> {
        self.tx
            .send(Inbound::Binary(Bytes::copy_from_slice(data)))
            .map_err(|_| ChannelError::Closed)
    }

    async fn send_text(&self, data: &str) -> Result<(), ChannelError> {
        self.tx
            .send(Inbound::Text(data.to_string()))
            .map_err(|_| ChannelError::Closed)
    }

    async fn recv(&self) -> Option<Inbound> {
        self.rx.lock().await.recv().await
    }

    fn buffered_amount(&self) -> u64 {
        self.buffered.load(Ordering::Relaxed)
    }
}
