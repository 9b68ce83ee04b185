//! Single-peer sender event loop: frames, seals, and paces chunks from a
//! source pipeline onto one [`Channel`].

use super::{ProgressTracker, TransferProgress};
use crate::congestion::CongestionController;
use crate::error::CoordinatorError;
use crate::frame::{FrameBuilder, FrameHeader, END_OF_STREAM};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use wraith_crypto::aead::FrameCrypto;
use wraith_transport::Channel;

/// A chunk of source data ready to be framed, produced by a source pipeline
/// (e.g. `wraith_files::source`) and consumed by [`SenderEngine`].
#[derive(Debug, Clone)]
pub struct SourceChunk {
    /// Manifest file index this chunk belongs to.
    pub file_index: u16,
    /// Byte offset within that file's (or the archive's) logical stream.
    pub offset: u64,
    /// Chunk payload.
    pub data: Vec<u8>,
}

/// How long the sender sleeps between polls while waiting for the transport
/// to drain below `cwnd`. There is no `drain_low` event on [`Channel`], so
/// this is a coarse poll rather than a wakeup.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Drives one peer's outgoing frame stream: pulls chunks, seals them (if a
/// crypto session is configured), paces sends against a congestion
/// controller, and emits the end-of-stream frame once the source is
/// exhausted.
pub struct SenderEngine {
    channel: Arc<dyn Channel>,
    crypto: Option<FrameCrypto>,
    congestion: CongestionController,
    ceiling: u64,
    sequence: u32,
    progress: ProgressTracker,
}

impl SenderEngine {
    /// Create a sender engine for one channel. `transport_high_water` seeds
    /// the congestion controller's ceiling; `total_size` is used only for
    /// progress ETA reporting.
    #[must_use]
    pub fn new(
        channel: Arc<dyn Channel>,
        crypto: Option<FrameCrypto>,
        transport_high_water: u64,
        total_size: u64,
    ) -> Self {
        Self {
            channel,
            crypto,
            congestion: CongestionController::new(transport_high_water),
            ceiling: transport_high_water.saturating_mul(2),
            sequence: 0,
            progress: ProgressTracker::new(total_size),
        }
    }

    /// Run the sender loop to completion: consumes `chunks` until the
    /// producer closes the channel, then emits the EOS frame. Returns the
    /// final sequence number (the EOS frame's sequence).
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::SendFailure` if the channel rejects a
    /// send.
    pub async fn run(
        mut self,
        mut chunks: mpsc::Receiver<SourceChunk>,
        progress_tx: Option<mpsc::Sender<TransferProgress>>,
    ) -> Result<u32, CoordinatorError> {
        while let Some(chunk) = chunks.recv().await {
            let frame_bytes = if let Some(crypto) = &self.crypto {
                let header_bytes = FrameHeader {
                    file_index: chunk.file_index,
                    sequence: self.sequence,
                    offset: chunk.offset,
                    data_length: u32::try_from(chunk.data.len())
                        .expect("chunk payload exceeds u32::MAX"),
                    integrity_tag: 0,
                }
                .to_bytes();
                let sealed = crypto
                    .seal(u64::from(self.sequence), &header_bytes, &chunk.data)
                    .map_err(|_| CoordinatorError::SendFailure("seal failed".into()))?;
                FrameBuilder::new()
                    .file_index(chunk.file_index)
                    .sequence(self.sequence)
                    .offset(chunk.offset)
                    .payload(&sealed)
                    .build_encrypted()
            } else {
                FrameBuilder::new()
                    .file_index(chunk.file_index)
                    .sequence(self.sequence)
                    .offset(chunk.offset)
                    .payload(&chunk.data)
                    .build_plaintext()
            };

            let sent_len = chunk.data.len() as u64;
            self.send_frame(frame_bytes).await?;
            self.sequence += 1;
            self.progress.add(sent_len);
            if let Some(tx) = &progress_tx {
                if let Some(report) = self.progress.maybe_report() {
                    let _ = tx.try_send(report);
                }
            }
        }

        let eos = FrameBuilder::build_eos(self.sequence);
        debug_assert_eq!(eos.len(), crate::FRAME_HEADER_SIZE);
        self.send_frame(eos).await?;
        let final_sequence = self.sequence;
        self.sequence += 1;
        Ok(final_sequence)
    }

    async fn send_frame(&mut self, bytes: Vec<u8>) -> Result<(), CoordinatorError> {
        while self.channel.buffered_amount() >= self.congestion.cwnd() {
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
        self.channel
            .send_binary(&bytes)
            .await
            .map_err(|e| CoordinatorError::SendFailure(e.to_string()))?;

        let utilization = self.channel.buffered_amount() as f64 / self.ceiling.max(1) as f64;
        if utilization > 0.9 {
            self.congestion.on_backpressure();
        } else if utilization < 0.5 {
            self.congestion.on_drain_without_backpressure();
        }
        Ok(())
    }
}
