//! Offset-indexed reorder buffer for one file's incoming data frames.
//!
//! Frames may arrive out of order on the underlying channel (the fan-out
//! coordinator fans the same stream to several peers, and individual
//! transport deliveries are not guaranteed to preserve sender order across
//! retries upstream of this buffer). The buffer holds out-of-order frames
//! until the gap at `next_expected_offset` closes, then releases the
//! longest contiguous run starting there.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Hard cap on buffered bytes before `BufferOverflow` is raised.
pub const MAX_BUFFERED_BYTES: usize = 64 * 1024 * 1024;

/// Time-to-live for a buffered out-of-order frame.
pub const FRAME_TTL: Duration = Duration::from_secs(30);

/// Interval between buffer TTL sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Raised when an incoming frame would push total buffered bytes past
/// [`MAX_BUFFERED_BYTES`].
#[derive(Debug, thiserror::Error)]
#[error("reorder buffer overflow")]
pub struct BufferOverflow;

struct Pending {
    data: Vec<u8>,
    arrived_at: Instant,
}

/// Reorder buffer for a single file's data stream.
pub struct ReorderBuffer {
    next_expected_offset: u64,
    pending: HashMap<u64, Pending>,
    buffered_bytes: usize,
    last_sweep: Instant,
}

impl ReorderBuffer {
    /// Create a buffer expecting its first frame at offset 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_expected_offset: 0,
            pending: HashMap::new(),
            buffered_bytes: 0,
            last_sweep: Instant::now(),
        }
    }

    /// Next contiguous offset the buffer is waiting on.
    #[must_use]
    pub fn next_expected_offset(&self) -> u64 {
        self.next_expected_offset
    }

    /// Number of bytes currently buffered out-of-order.
    #[must_use]
    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    /// Insert an arriving frame's payload at `offset`, returning the
    /// contiguous run of bytes (possibly spanning several prior arrivals)
    /// now ready for the sink, in stream order.
    ///
    /// Duplicate or past offsets (offset < next_expected_offset, or an
    /// offset already buffered) are silently ignored and return an empty
    /// vector.
    ///
    /// # Errors
    ///
    /// Returns `BufferOverflow` if admitting this frame would exceed
    /// [`MAX_BUFFERED_BYTES`] of total buffered data.
    pub fn insert(&mut self, offset: u64, data: &[u8]) -> Result<Vec<u8>, BufferOverflow> {
        self.maybe_sweep();

        if offset < self.next_expected_offset || self.pending.contains_key(&offset) {
            return Ok(Vec::new());
        }

        if self.buffered_bytes + data.len() > MAX_BUFFERED_BYTES {
            return Err(BufferOverflow);
        }

        if offset == self.next_expected_offset {
            let mut ready = data.to_vec();
            self.next_expected_offset += data.len() as u64;
            self.drain_contiguous(&mut ready);
            return Ok(ready);
        }

        self.buffered_bytes += data.len();
        self.pending.insert(
            offset,
            Pending {
                data: data.to_vec(),
                arrived_at: Instant::now(),
            },
        );
        Ok(Vec::new())
    }

    fn drain_contiguous(&mut self, ready: &mut Vec<u8>) {
        while let Some(pending) = self.pending.remove(&self.next_expected_offset) {
            self.buffered_bytes -= pending.data.len();
            self.next_expected_offset += pending.data.len() as u64;
            ready.extend_from_slice(&pending.data);
        }
    }

    fn maybe_sweep(&mut self) {
        if self.last_sweep.elapsed() < SWEEP_INTERVAL {
            return;
        }
        self.last_sweep = Instant::now();
        let now = Instant::now();
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, p)| now.duration_since(p.arrived_at) >= FRAME_TTL)
            .map(|(offset, _)| *offset)
            .collect();
        for offset in expired {
            if let Some(p) = self.pending.remove(&offset) {
                self.buffered_bytes -= p.data.len();
            }
        }
    }
}

impl Default for ReorderBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_order_frames_release_immediately() {
        let mut buf = ReorderBuffer::new();
        assert_eq!(buf.insert(0, b"abc").unwrap(), b"abc");
        assert_eq!(buf.insert(3, b"def").unwrap(), b"def");
        assert_eq!(buf.next_expected_offset(), 6);
    }

    #[test]
    fn out_of_order_frame_buffers_until_gap_closes() {
        let mut buf = ReorderBuffer::new();
        assert_eq!(buf.insert(3, b"def").unwrap(), Vec::<u8>::new());
        assert_eq!(buf.buffered_bytes(), 3);
        assert_eq!(buf.insert(0, b"abc").unwrap(), b"abcdef");
        assert_eq!(buf.buffered_bytes(), 0);
    }

    #[test]
    fn releases_longest_contiguous_run() {
        let mut buf = ReorderBuffer::new();
        buf.insert(6, b"ghi").unwrap();
        buf.insert(3, b"def").unwrap();
        let released = buf.insert(0, b"abc").unwrap();
        assert_eq!(released, b"abcdefghi");
        assert_eq!(buf.next_expected_offset(), 9);
    }

    #[test]
    fn duplicate_offset_is_ignored() {
        let mut buf = ReorderBuffer::new();
        buf.insert(3, b"def").unwrap();
        assert_eq!(buf.insert(3, b"xyz").unwrap(), Vec::<u8>::new());
        assert_eq!(buf.buffered_bytes(), 3);
    }

    #[test]
    fn past_offset_is_ignored() {
        let mut buf = ReorderBuffer::new();
        buf.insert(0, b"abc").unwrap();
        assert_eq!(buf.insert(0, b"xyz").unwrap(), Vec::<u8>::new());
        assert_eq!(buf.next_expected_offset(), 3);
    }

    #[test]
    fn overflow_raises_error() {
        let mut buf = ReorderBuffer::new();
        let chunk = vec![0u8; 1024 * 1024];
        let mut offset = 1;
        loop {
            match buf.insert(offset, &chunk) {
                Ok(_) => offset += chunk.len() as u64,
                Err(BufferOverflow) => break,
            }
            assert!(offset < 200 * 1024 * 1024, "overflow never triggered");
        }
    }
}
