//! The contract a received transfer is written through. Defined here
//! alongside [`crate::channel::Channel`] and [`crate::signaling::Signaling`]
//! because it is the third external collaborator the engine depends on
//! without implementing itself.

use async_trait::async_trait;
use thiserror::Error;

/// Errors a `Sink` implementation may surface.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink could not be initialized for the given manifest.
    #[error("sink init failed: {0}")]
    Init(String),

    /// A write to an already-finished or unknown file index was attempted.
    #[error("write to unknown file index {0}")]
    UnknownFile(u16),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

/// Where completed bytes for a transfer are written.
///
/// A `Sink` is initialized against a manifest before any frames flow; if
/// initialization fails the transfer aborts before the first frame is
/// accepted. Once running, writes are addressed by `(file_index, offset)`
/// and may arrive out of order — the reorder buffer upstream only
/// guarantees in-order delivery within the window it can hold, not globally.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Write `data` at `offset` within the logical stream addressed by
    /// `file_index`.
    async fn write_at(&self, file_index: u16, offset: u64, data: &[u8]) -> Result<(), SinkError>;

    /// Called once end-of-stream has been observed and every write has been
    /// acknowledged; gives the sink a chance to flush and close files.
    async fn finalize(&self) -> Result<(), SinkError>;
}
