//! Adaptive congestion control: additive-increase/multiplicative-decrease
//! with a slow-start ramp, driven by transport backpressure rather than
//! packet loss (the channel is assumed ordered and reliable; the only
//! negative signal is the transport's buffered-amount high-water mark).

use std::time::Duration;

const INITIAL_CWND: u64 = 1024 * 1024;
const CWND_FLOOR: u64 = 512 * 1024;
const SSTHRESH_FLOOR: u64 = 256 * 1024;
const INITIAL_SSTHRESH: u64 = 8 * 1024 * 1024;
const MIN_BATCH_SIZE: u32 = 8;
const MAX_BATCH_SIZE: u32 = 64;

/// Fixed per-sample growth applied in congestion avoidance, once every two
/// consecutive good samples.
const CONGESTION_AVOIDANCE_STEP: u64 = 128 * 1024;

/// Congestion controller phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Exponential growth until the first backpressure signal.
    SlowStart,
    /// Fixed-step growth, once past `ssthresh` or after a backpressure
    /// signal.
    CongestionAvoidance,
}

/// Chunk size selected for the current RTT estimate.
#[must_use]
pub fn chunk_size_for_rtt(rtt: Duration) -> u32 {
    if rtt < Duration::from_millis(50) {
        64 * 1024
    } else if rtt <= Duration::from_millis(150) {
        32 * 1024
    } else {
        16 * 1024
    }
}

/// Adaptive congestion controller for one sender-side transport connection.
pub struct CongestionController {
    cwnd: u64,
    ssthresh: u64,
    ceiling: u64,
    mode: Mode,
    good_samples: u32,
}

impl CongestionController {
    /// Create a controller. `transport_high_water` is the transport's
    /// configured buffered-amount high-water mark; `cwnd`'s ceiling is
    /// twice that value.
    #[must_use]
    pub fn new(transport_high_water: u64) -> Self {
        Self {
            cwnd: INITIAL_CWND,
            ssthresh: INITIAL_SSTHRESH,
            ceiling: transport_high_water.saturating_mul(2),
            mode: Mode::SlowStart,
            good_samples: 0,
        }
    }

    /// Current congestion window in bytes.
    #[must_use]
    pub fn cwnd(&self) -> u64 {
        self.cwnd
    }

    /// Current mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Number of chunks of `chunk_size` bytes that may be in flight before
    /// awaiting drain, clamped to `[8, 64]`.
    #[must_use]
    pub fn next_batch_size(&self, chunk_size: u32) -> u32 {
        let raw = self.cwnd / u64::from(chunk_size.max(1));
        u32::try_from(raw)
            .unwrap_or(MAX_BATCH_SIZE)
            .clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE)
    }

    /// Record a round in which the transport drained without hitting its
    /// high-water mark: grow the window.
    pub fn on_drain_without_backpressure(&mut self) {
        match self.mode {
            Mode::SlowStart => {
                self.cwnd = (self.cwnd * 2).min(self.ssthresh).min(self.ceiling);
                if self.cwnd >= self.ssthresh {
                    self.mode = Mode::CongestionAvoidance;
                }
            }
            Mode::CongestionAvoidance => {
                self.good_samples += 1;
                if self.good_samples >= 2 {
                    self.good_samples = 0;
                    self.cwnd = (self.cwnd + CONGESTION_AVOIDANCE_STEP).min(self.ceiling);
                }
            }
        }
    }

    /// Record a backpressure signal (transport buffered amount hit its
    /// high-water mark): halve the window and drop straight back into
    /// congestion avoidance.
    pub fn on_backpressure(&mut self) {
        self.ssthresh = (self.cwnd / 2).max(SSTHRESH_FLOOR);
        self.cwnd = (self.cwnd / 2).max(CWND_FLOOR);
        self.mode = Mode::CongestionAvoidance;
        self.good_samples = 0;
    }
}
