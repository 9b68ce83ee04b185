//! The sender/receiver event loops and the fan-out coordinator that drives
//! them across one-to-many batches.

pub mod coordinator;
pub mod receiver;
pub mod sender;

pub use coordinator::{Coordinator, PeerId};
pub use receiver::ReceiverEngine;
pub use sender::{SenderEngine, SourceChunk};

use std::time::{Duration, Instant};

/// Minimum interval between emitted progress reports.
pub const PROGRESS_THROTTLE: Duration = Duration::from_millis(100);

/// A structured progress report emitted by both the sender and receiver
/// engines, consumed by a host's UI (e.g. `wraith-cli`'s progress bar) and
/// otherwise purely observational.
#[derive(Debug, Clone, Copy)]
pub struct TransferProgress {
    /// Total bytes expected for this logical stream.
    pub bytes_total: u64,
    /// Bytes transferred so far.
    pub bytes_transferred: u64,
    /// Instantaneous throughput in bytes/second since the last report.
    pub instantaneous_bps: f64,
    /// Exponentially weighted moving average throughput in bytes/second.
    pub ewma_bps: f64,
    /// Estimated time to completion, if throughput is nonzero.
    pub eta: Option<Duration>,
}

/// EWMA smoothing factor; close to 1 weights recent samples heavily, which
/// suits the short bursty windows a transfer engine actually produces.
const EWMA_ALPHA: f64 = 0.3;

/// Tracks throughput and throttles progress emission to [`PROGRESS_THROTTLE`].
pub(crate) struct ProgressTracker {
    bytes_total: u64,
    bytes_transferred: u64,
    last_report_at: Instant,
    last_report_bytes: u64,
    ewma_bps: f64,
}

impl ProgressTracker {
    pub(crate) fn new(bytes_total: u64) -> Self {
        Self {
            bytes_total,
            bytes_transferred: 0,
            last_report_at: Instant::now(),
            last_report_bytes: 0,
            ewma_bps: 0.0,
        }
    }

    pub(crate) fn add(&mut self, delta: u64) {
        self.bytes_transferred += delta;
    }

    /// Returns a report if at least [`PROGRESS_THROTTLE`] has elapsed since
    /// the last one, else `None`.
    pub(crate) fn maybe_report(&mut self) -> Option<TransferProgress> {
        let elapsed = self.last_report_at.elapsed();
        if elapsed < PROGRESS_THROTTLE {
            return None;
        }
        let delta_bytes = self.bytes_transferred - self.last_report_bytes;
        let instantaneous_bps = delta_bytes as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        self.ewma_bps = if self.ewma_bps == 0.0 {
            instantaneous_bps
        } else {
            EWMA_ALPHA * instantaneous_bps + (1.0 - EWMA_ALPHA) * self.ewma_bps
        };
        self.last_report_at = Instant::now();
        self.last_report_bytes = self.bytes_transferred;

        let remaining = self.bytes_total.saturating_sub(self.bytes_transferred);
        let eta = if self.ewma_bps > 0.0 {
            Some(Duration::from_secs_f64(remaining as f64 / self.ewma_bps))
        } else {
            None
        };

        Some(TransferProgress {
            bytes_total: self.bytes_total,
            bytes_transferred: self.bytes_transferred,
            instantaneous_bps,
            ewma_bps: self.ewma_bps,
            eta,
        })
    }
}
