//! Fan-out coordinator: batches up to [`crate::MAX_DIRECT_PEERS`] receivers
//! onto one sender pipeline pass, queues late arrivals for the next batch,
//! and tracks completion across the whole session.

use super::sender::SourceChunk;
use crate::error::CoordinatorError;
use crate::manifest::{ControlMessage, Manifest};
use crate::{FRAME_HEADER_SIZE, MAX_DIRECT_PEERS};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use wraith_crypto::aead::FrameCrypto;
use wraith_transport::Channel;

/// Stable identifier for an attached peer. Peers are referenced by id
/// everywhere in the coordinator rather than by owning reference, so
/// teardown is a single pass over the peer map instead of untangling a
/// reference cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(u64);

struct PeerRecord {
    channel: Arc<dyn Channel>,
    ready: bool,
    completed: bool,
    attached_at: Instant,
}

/// What the coordinator decided after a peer announced readiness.
#[derive(Debug)]
pub enum ReadinessOutcome {
    /// Start a batch now with these peers.
    StartNow(Vec<PeerId>),
    /// A batch is already active; this peer is queued for the next one.
    Queued,
    /// No batch is active yet and not everyone is ready: the host should
    /// arm a `BATCH_READINESS_WINDOW` timer and call
    /// [`Coordinator::batch_timer_fire`] when it elapses.
    ArmTimer,
}

/// What to do once a batch completes (every member has sent
/// `DOWNLOAD_COMPLETE`).
#[derive(Debug)]
pub enum BatchOutcome {
    /// Promote these queued peers into a fresh batch.
    Promote(Vec<PeerId>),
    /// Start immediately with these already-ready peers.
    StartNow(Vec<PeerId>),
    /// No one is ready; wait for the next `TRANSFER_READY`.
    WaitForReady,
    /// Every attached peer has completed.
    AllComplete,
}

/// Snapshot of the coordinator's state for observability.
#[derive(Debug, Clone)]
pub struct SwarmState {
    /// All currently attached peers.
    pub peers: Vec<PeerId>,
    /// Peers receiving the active batch.
    pub current_batch: Vec<PeerId>,
    /// Peers queued for the next batch.
    pub queue: Vec<PeerId>,
    /// Peers that have completed at least once this session.
    pub completed_this_session: Vec<PeerId>,
}

/// Owns the set of attached peer transports for one transfer and
/// orchestrates fan-out across batches. Does not open connections itself —
/// the host attaches already-open [`Channel`]s (typically returned by a
/// `wraith_transport::Signaling` implementation).
pub struct Coordinator {
    manifest: Manifest,
    peers: HashMap<PeerId, PeerRecord>,
    current_batch: Vec<PeerId>,
    queue: VecDeque<PeerId>,
    completed_this_session: HashSet<PeerId>,
    next_id: u64,
    batch_active: bool,
}

impl Coordinator {
    /// Create a coordinator for one transfer's manifest.
    #[must_use]
    pub fn new(manifest: Manifest) -> Self {
        Self {
            manifest,
            peers: HashMap::new(),
            current_batch: Vec::new(),
            queue: VecDeque::new(),
            completed_this_session: HashSet::new(),
            next_id: 0,
            batch_active: false,
        }
    }

    /// Attach a newly-connected peer.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::SlotLimit` if [`MAX_DIRECT_PEERS`] peers
    /// are already attached.
    pub fn attach_peer(&mut self, channel: Arc<dyn Channel>) -> Result<PeerId, CoordinatorError> {
        if self.peers.len() >= MAX_DIRECT_PEERS {
            return Err(CoordinatorError::SlotLimit);
        }
        let id = PeerId(self.next_id);
        self.next_id += 1;
        self.peers.insert(
            id,
            PeerRecord {
                channel,
                ready: false,
                completed: false,
                attached_at: Instant::now(),
            },
        );
        tracing::info!(peer = id.0, "peer attached");
        Ok(id)
    }

    /// Detach a peer, e.g. on `ConnectTimeout` or transport close.
    pub fn detach_peer(&mut self, id: PeerId) {
        self.peers.remove(&id);
        self.current_batch.retain(|p| *p != id);
        self.queue.retain(|p| *p != id);
    }

    /// Peers whose connect deadline has elapsed and have not yet become
    /// ready; the host should detach these with cause `timeout`.
    #[must_use]
    pub fn connect_timed_out(&self, connect_timeout: Duration) -> Vec<PeerId> {
        self.peers
            .iter()
            .filter(|(_, p)| !p.ready && p.attached_at.elapsed() >= connect_timeout)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Record that a peer announced `TRANSFER_READY` and evaluate the
    /// readiness policy (§4.9): a lone ready peer or a fully-ready room
    /// starts immediately, otherwise the host should arm the batch timer.
    pub fn mark_ready(&mut self, id: PeerId) -> ReadinessOutcome {
        if let Some(peer) = self.peers.get_mut(&id) {
            peer.ready = true;
        } else {
            return ReadinessOutcome::Queued;
        }

        if self.batch_active {
            self.queue.push_back(id);
            return ReadinessOutcome::Queued;
        }

        let ready = self.ready_non_completed();
        let connected_non_completed = self.connected_non_completed();
        if ready.len() == 1 && connected_non_completed.len() == 1 {
            return ReadinessOutcome::StartNow(ready);
        }
        if !ready.is_empty() && ready.len() == connected_non_completed.len() {
            return ReadinessOutcome::StartNow(ready);
        }
        ReadinessOutcome::ArmTimer
    }

    /// Called when the `BATCH_READINESS_WINDOW` timer armed by
    /// [`ReadinessOutcome::ArmTimer`] elapses: starts a batch with whoever
    /// is ready at that moment.
    #[must_use]
    pub fn batch_timer_fire(&self) -> Vec<PeerId> {
        self.ready_non_completed()
    }

    fn ready_non_completed(&self) -> Vec<PeerId> {
        self.peers
            .iter()
            .filter(|(_, p)| p.ready && !p.completed)
            .map(|(id, _)| *id)
            .collect()
    }

    fn connected_non_completed(&self) -> Vec<PeerId> {
        self.peers
            .iter()
            .filter(|(_, p)| !p.completed)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Snapshot `current_batch` to `members`, mark the coordinator active,
    /// and compute who was connected-but-excluded (for
    /// `TRANSFER_STARTED_WITHOUT_YOU`).
    pub fn start_batch(&mut self, members: Vec<PeerId>) -> Vec<PeerId> {
        let excluded = self
            .connected_non_completed()
            .into_iter()
            .filter(|id| !members.contains(id))
            .collect();
        self.current_batch = members;
        self.batch_active = true;
        excluded
    }

    /// Broadcast a control message to every member of `current_batch`.
    /// Returns the peers whose send failed (non-fatal: they are detached by
    /// the caller).
    pub async fn broadcast_control(&self, message: &ControlMessage) -> Vec<PeerId> {
        let json = serde_json::to_string(message).expect("ControlMessage always serializes");
        let mut failed = Vec::new();
        for id in &self.current_batch {
            if let Some(peer) = self.peers.get(id) {
                if peer.channel.send_text(&json).await.is_err() {
                    failed.push(*id);
                }
            }
        }
        failed
    }

    /// Run one batch's sender pipeline, broadcasting every produced frame to
    /// every member of `current_batch`. The slowest peer's `buffered_amount`
    /// gates the whole batch (§4.9). Peers that fail a send are dropped from
    /// `current_batch` and returned in `dropped`; other peers continue.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::SendFailure` if every peer in the batch
    /// has been dropped (nothing left to send to).
    pub async fn run_batch(
        &mut self,
        mut chunks: mpsc::Receiver<SourceChunk>,
        crypto: Option<FrameCrypto>,
        transport_high_water: u64,
    ) -> Result<Vec<PeerId>, CoordinatorError> {
        if let Some(crypto) = &crypto {
            crypto.reset();
        }
        let mut congestion = crate::congestion::CongestionController::new(transport_high_water);
        let ceiling = transport_high_water.saturating_mul(2);
        let mut sequence: u32 = 0;
        let mut dropped = Vec::new();

        while let Some(chunk) = chunks.recv().await {
            if self.current_batch.is_empty() {
                return Err(CoordinatorError::SendFailure(
                    "every peer in the batch was dropped".into(),
                ));
            }

            let frame_bytes = self.build_frame(&chunk, sequence, crypto.as_ref())?;

            loop {
                let max_buffered = self.max_buffered_amount();
                if max_buffered < congestion.cwnd() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }

            self.send_to_batch(&frame_bytes, &mut dropped).await;

            let utilization = self.max_buffered_amount() as f64 / ceiling.max(1) as f64;
            if utilization > 0.9 {
                congestion.on_backpressure();
            } else if utilization < 0.5 {
                congestion.on_drain_without_backpressure();
            }
            sequence += 1;
        }

        if !self.current_batch.is_empty() {
            let eos = crate::frame::FrameBuilder::build_eos(sequence);
            debug_assert_eq!(eos.len(), FRAME_HEADER_SIZE);
            self.send_to_batch(&eos, &mut dropped).await;
        }

        Ok(dropped)
    }

    fn build_frame(
        &self,
        chunk: &SourceChunk,
        sequence: u32,
        crypto: Option<&FrameCrypto>,
    ) -> Result<Vec<u8>, CoordinatorError> {
        use crate::frame::{FrameBuilder, FrameHeader};
        if let Some(crypto) = crypto {
            let header_bytes = FrameHeader {
                file_index: chunk.file_index,
                sequence,
                offset: chunk.offset,
                data_length: u32::try_from(chunk.data.len())
                    .expect("chunk payload exceeds u32::MAX"),
                integrity_tag: 0,
            }
            .to_bytes();
            let sealed = crypto
                .seal(u64::from(sequence), &header_bytes, &chunk.data)
                .map_err(|_| CoordinatorError::SendFailure("seal failed".into()))?;
            Ok(FrameBuilder::new()
                .file_index(chunk.file_index)
                .sequence(sequence)
                .offset(chunk.offset)
                .payload(&sealed)
                .build_encrypted())
        } else {
            Ok(FrameBuilder::new()
                .file_index(chunk.file_index)
                .sequence(sequence)
                .offset(chunk.offset)
                .payload(&chunk.data)
                .build_plaintext())
        }
    }

    fn max_buffered_amount(&self) -> u64 {
        self.current_batch
            .iter()
            .filter_map(|id| self.peers.get(id))
            .map(|p| p.channel.buffered_amount())
            .max()
            .unwrap_or(0)
    }

    async fn send_to_batch(&mut self, bytes: &[u8], dropped: &mut Vec<PeerId>) {
        let mut failed = Vec::new();
        for id in &self.current_batch {
            if let Some(peer) = self.peers.get(id) {
                if peer.channel.send_binary(bytes).await.is_err() {
                    failed.push(*id);
                }
            }
        }
        for id in failed {
            self.current_batch.retain(|p| *p != id);
            dropped.push(id);
            tracing::warn!(peer = id.0, "dropped from batch after send failure");
        }
    }

    /// Record that a peer sent `DOWNLOAD_COMPLETE`.
    pub fn mark_completed(&mut self, id: PeerId) {
        if let Some(peer) = self.peers.get_mut(&id) {
            peer.completed = true;
        }
        self.completed_this_session.insert(id);
        self.current_batch.retain(|p| *p != id);
    }

    /// Called once `current_batch` is empty because every member completed:
    /// decide what happens next per §4.9's batch-completion rules.
    pub fn on_batch_complete(&mut self) -> BatchOutcome {
        self.batch_active = false;
        if !self.queue.is_empty() {
            return BatchOutcome::Promote(self.queue.drain(..).collect());
        }
        let ready = self.ready_non_completed();
        if !ready.is_empty() {
            return BatchOutcome::StartNow(ready);
        }
        if self.peers.values().any(|p| !p.completed) {
            return BatchOutcome::WaitForReady;
        }
        BatchOutcome::AllComplete
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> SwarmState {
        SwarmState {
            peers: self.peers.keys().copied().collect(),
            current_batch: self.current_batch.clone(),
            queue: self.queue.iter().copied().collect(),
            completed_this_session: self.completed_this_session.iter().copied().collect(),
        }
    }

    /// The manifest this coordinator is fanning out.
    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::FileEntry;
    use wraith_transport::LoopbackChannel;

    fn manifest() -> Manifest {
        Manifest::new(
            "warp_test".into(),
            "a.bin".into(),
            vec![FileEntry {
                id: 0,
                name: "a.bin".into(),
                path: "a.bin".into(),
                size: 6,
                mime: None,
                mtime: None,
            }],
            false,
        )
    }

    fn attach(coordinator: &mut Coordinator) -> (PeerId, LoopbackChannel) {
        let (host_side, peer_side) = LoopbackChannel::pair();
        let id = coordinator.attach_peer(Arc::new(host_side)).unwrap();
        (id, peer_side)
    }

    #[test]
    fn fourth_peer_is_rejected_with_slot_limit() {
        let mut coordinator = Coordinator::new(manifest());
        for _ in 0..MAX_DIRECT_PEERS {
            attach(&mut coordinator);
        }
        let (_extra, _extra_peer) = LoopbackChannel::pair();
        assert!(matches!(
            coordinator.attach_peer(Arc::new(_extra)),
            Err(CoordinatorError::SlotLimit)
        ));
    }

    #[test]
    fn lone_ready_peer_starts_immediately() {
        let mut coordinator = Coordinator::new(manifest());
        let (id, _peer) = attach(&mut coordinator);
        assert!(matches!(
            coordinator.mark_ready(id),
            ReadinessOutcome::StartNow(peers) if peers == vec![id]
        ));
    }

    #[test]
    fn partial_readiness_arms_timer_until_all_ready() {
        let mut coordinator = Coordinator::new(manifest());
        let (id_a, _a) = attach(&mut coordinator);
        let (id_b, _b) = attach(&mut coordinator);
        assert!(matches!(
            coordinator.mark_ready(id_a),
            ReadinessOutcome::ArmTimer
        ));
        assert!(matches!(
            coordinator.mark_ready(id_b),
            ReadinessOutcome::StartNow(_)
        ));
    }

    #[test]
    fn late_ready_during_active_batch_is_queued() {
        let mut coordinator = Coordinator::new(manifest());
        let (id_a, _a) = attach(&mut coordinator);
        let (id_b, _b) = attach(&mut coordinator);
        coordinator.mark_ready(id_a);
        coordinator.start_batch(vec![id_a]);
        assert!(matches!(
            coordinator.mark_ready(id_b),
            ReadinessOutcome::Queued
        ));
    }

    #[test]
    fn batch_completion_promotes_queued_peers() {
        let mut coordinator = Coordinator::new(manifest());
        let (id_a, _a) = attach(&mut coordinator);
        let (id_b, _b) = attach(&mut coordinator);
        coordinator.mark_ready(id_a);
        coordinator.start_batch(vec![id_a]);
        coordinator.mark_ready(id_b);
        coordinator.mark_completed(id_a);
        match coordinator.on_batch_complete() {
            BatchOutcome::Promote(peers) => assert_eq!(peers, vec![id_b]),
            other => panic!("expected Promote, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn batch_frames_broadcast_to_every_member() {
        let mut coordinator = Coordinator::new(manifest());
        let (id_a, peer_a) = attach(&mut coordinator);
        let (id_b, peer_b) = attach(&mut coordinator);
        coordinator.start_batch(vec![id_a, id_b]);

        let (chunk_tx, chunk_rx) = mpsc::channel(2);
        chunk_tx
            .send(SourceChunk {
                file_index: 0,
                offset: 0,
                data: b"abcdef".to_vec(),
            })
            .await
            .unwrap();
        drop(chunk_tx);

        let dropped = coordinator
            .run_batch(chunk_rx, None, 8 * 1024 * 1024)
            .await
            .unwrap();
        assert!(dropped.is_empty());

        for peer in [&peer_a, &peer_b] {
            let data_frame = peer.recv().await.unwrap();
            assert!(matches!(data_frame, wraith_transport::Inbound::Binary(_)));
            let eos_frame = peer.recv().await.unwrap();
            assert!(matches!(eos_frame, wraith_transport::Inbound::Binary(_)));
        }
    }

    #[tokio::test]
    async fn send_failure_drops_peer_but_batch_continues() {
        let mut coordinator = Coordinator::new(manifest());
        let (id_a, peer_a) = attach(&mut coordinator);
        let (id_b, peer_b) = attach(&mut coordinator);
        coordinator.start_batch(vec![id_a, id_b]);
        drop(peer_b); // peer_b's receiving half is gone; sends to it will fail

        let (chunk_tx, chunk_rx) = mpsc::channel(2);
        chunk_tx
            .send(SourceChunk {
                file_index: 0,
                offset: 0,
                data: b"abc".to_vec(),
            })
            .await
            .unwrap();
        drop(chunk_tx);

        let dropped = coordinator
            .run_batch(chunk_rx, None, 8 * 1024 * 1024)
            .await
            .unwrap();
        assert_eq!(dropped, vec![id_b]);
        assert!(peer_a.recv().await.is_some());
    }
}
