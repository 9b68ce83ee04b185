//! Single-peer receiver event loop: classifies inbound messages, opens and
//! reorders binary frames, and forwards ordered bytes to a [`Sink`].

use super::{ProgressTracker, TransferProgress};
use crate::error::{CoordinatorError, FrameError};
use crate::frame::Frame;
use crate::manifest::ControlMessage;
use crate::reorder::ReorderBuffer;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use wraith_crypto::aead::FrameCrypto;
use wraith_transport::{Channel, Inbound, Sink};

/// Drives one peer's incoming frame stream: classifies each inbound message,
/// opens binary frames (if a crypto session is configured), reorders them
/// per file, and writes ordered bytes through a [`Sink`].
pub struct ReceiverEngine {
    channel: Arc<dyn Channel>,
    crypto: Option<FrameCrypto>,
    sink: Arc<dyn Sink>,
    reorder: HashMap<u16, ReorderBuffer>,
    progress: ProgressTracker,
}

impl ReceiverEngine {
    /// Create a receiver engine for one channel and sink.
    #[must_use]
    pub fn new(
        channel: Arc<dyn Channel>,
        crypto: Option<FrameCrypto>,
        sink: Arc<dyn Sink>,
        total_size: u64,
    ) -> Self {
        Self {
            channel,
            crypto,
            sink,
            reorder: HashMap::new(),
            progress: ProgressTracker::new(total_size),
        }
    }

    /// Run the receiver loop until end-of-stream or the channel closes.
    /// Inbound control messages are handed to `on_control` as they arrive;
    /// the coordinator (not this engine) decides what to do with them.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::MalformedFrame` on a truncated or
    /// CRC-mismatched frame, `CoordinatorError::AuthFailure` if AEAD
    /// verification fails, or `CoordinatorError::ReorderOverflow` if the
    /// reorder buffer's capacity is exceeded — all fatal to this receiver.
    pub async fn run(
        mut self,
        progress_tx: Option<mpsc::Sender<TransferProgress>>,
        mut on_control: impl FnMut(ControlMessage),
    ) -> Result<(), CoordinatorError> {
        loop {
            let Some(inbound) = self.channel.recv().await else {
                break;
            };
            match inbound {
                Inbound::Text(text) => {
                    if let Ok(msg) = serde_json::from_str::<ControlMessage>(&text) {
                        on_control(msg);
                    } else {
                        tracing::warn!("dropping unparseable control message");
                    }
                }
                Inbound::Binary(bytes) => {
                    let frame = Frame::parse(&bytes)?;
                    let header = *frame.header();
                    if header.is_eos() {
                        self.sink
                            .finalize()
                            .await
                            .map_err(|e| CoordinatorError::SinkInitFailure(e.to_string()))?;
                        break;
                    }

                    let plaintext: Vec<u8> = if let Some(crypto) = &self.crypto {
                        crypto
                            .open(
                                u64::from(header.sequence),
                                &header.to_bytes(),
                                frame.payload(),
                            )
                            .map_err(|_| CoordinatorError::AuthFailure)?
                    } else {
                        if !frame.verify_crc() {
                            return Err(FrameError::IntegrityMismatch.into());
                        }
                        frame.payload().to_vec()
                    };

                    let buf = self.reorder.entry(header.file_index).or_default();
                    let offset_before = buf.next_expected_offset();
                    let released = buf
                        .insert(header.offset, &plaintext)
                        .map_err(|_| CoordinatorError::ReorderOverflow)?;

                    if !released.is_empty() {
                        let len = released.len() as u64;
                        self.sink
                            .write_at(header.file_index, offset_before, &released)
                            .await
                            .map_err(|e| CoordinatorError::SendFailure(e.to_string()))?;
                        self.progress.add(len);
                    }

                    if let Some(tx) = &progress_tx {
                        if let Some(report) = self.progress.maybe_report() {
                            let _ = tx.try_send(report);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameBuilder;
    use wraith_transport::LoopbackChannel;

    struct MemorySink {
        written: tokio::sync::Mutex<Vec<(u16, u64, Vec<u8>)>>,
        finalized: std::sync::atomic::AtomicBool,
    }

    impl MemorySink {
        fn new() -> Self {
            Self {
                written: tokio::sync::Mutex::new(Vec::new()),
                finalized: std::sync::atomic::AtomicBool::new(false),
            }
        }
    }

    #[async_trait::async_trait]
    impl Sink for MemorySink {
        async fn write_at(
            &self,
            file_index: u16,
            offset: u64,
            data: &[u8],
        ) -> Result<(), wraith_transport::SinkError> {
            self.written
                .lock()
                .await
                .push((file_index, offset, data.to_vec()));
            Ok(())
        }

        async fn finalize(&self) -> Result<(), wraith_transport::SinkError> {
            self.finalized
                .store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn plaintext_frames_land_in_order_and_finalize_on_eos() {
        let (a, b) = LoopbackChannel::pair();
        let sink = Arc::new(MemorySink::new());
        let engine = ReceiverEngine::new(Arc::new(b), None, sink.clone(), 6);

        a.send_binary(
            &FrameBuilder::new()
                .file_index(0)
                .sequence(0)
                .offset(0)
                .payload(b"abc")
                .build_plaintext(),
        )
        .await
        .unwrap();
        a.send_binary(
            &FrameBuilder::new()
                .file_index(0)
                .sequence(1)
                .offset(3)
                .payload(b"def")
                .build_plaintext(),
        )
        .await
        .unwrap();
        a.send_binary(&FrameBuilder::build_eos(2)).await.unwrap();

        engine.run(None, |_| {}).await.unwrap();

        let written = sink.written.lock().await;
        assert_eq!(written.len(), 2);
        assert_eq!(written[0], (0, 0, b"abc".to_vec()));
        assert_eq!(written[1], (0, 3, b"def".to_vec()));
        assert!(sink.finalized.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn out_of_order_frames_are_released_in_stream_order() {
        let (a, b) = LoopbackChannel::pair();
        let sink = Arc::new(MemorySink::new());
        let engine = ReceiverEngine::new(Arc::new(b), None, sink.clone(), 6);

        a.send_binary(
            &FrameBuilder::new()
                .file_index(0)
                .sequence(1)
                .offset(3)
                .payload(b"def")
                .build_plaintext(),
        )
        .await
        .unwrap();
        a.send_binary(
            &FrameBuilder::new()
                .file_index(0)
                .sequence(0)
                .offset(0)
                .payload(b"abc")
                .build_plaintext(),
        )
        .await
        .unwrap();
        a.send_binary(&FrameBuilder::build_eos(2)).await.unwrap();

        engine.run(None, |_| {}).await.unwrap();

        let written = sink.written.lock().await;
        assert_eq!(written.last().unwrap().2, b"abcdef".to_vec());
    }

    #[tokio::test]
    async fn tampered_header_under_aead_is_auth_failure() {
        let shared = [5u8; 32];
        let send_keys = wraith_crypto::kdf::derive_session_keys(&shared, true);
        let recv_keys = wraith_crypto::kdf::derive_session_keys(&shared, false);
        let sender_crypto = FrameCrypto::new(&send_keys);
        let receiver_crypto = FrameCrypto::new(&recv_keys);

        let (a, b) = LoopbackChannel::pair();
        let sink = Arc::new(MemorySink::new());
        let engine = ReceiverEngine::new(Arc::new(b), Some(receiver_crypto), sink, 3);

        let header = crate::frame::FrameHeader {
            file_index: 0,
            sequence: 0,
            offset: 0,
            data_length: 3,
            integrity_tag: 0,
        };
        let sealed = sender_crypto.seal(0, &header.to_bytes(), b"abc").unwrap();
        let mut bytes = FrameBuilder::new()
            .file_index(1) // mismatched file_index corrupts the AAD
            .sequence(0)
            .offset(0)
            .payload(&sealed)
            .build_encrypted();
        bytes[0] = 1;

        a.send_binary(&bytes).await.unwrap();

        let result = engine.run(None, |_| {}).await;
        assert!(matches!(result, Err(CoordinatorError::AuthFailure)));
    }
}
