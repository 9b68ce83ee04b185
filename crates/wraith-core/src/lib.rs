//! # wraith-warp core
//!
//! The transfer engine: the wire frame codec, congestion control, the
//! reorder buffer, the manifest/control-message envelope, and the
//! sender/receiver/coordinator event loops that tie them together.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   engine::coordinator (fan-out)                 │
//! │   batches peers, promotes queued peers, owns per-peer sessions  │
//! ├─────────────────────────────────────────────────────────────────┤
//! │         engine::sender            │        engine::receiver     │
//! │   frames + seals + paces chunks   │  opens + reorders + sinks   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   congestion (AIMD)   │   reorder (offset buffer)   │  manifest │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                          frame (wire codec)                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! This crate does not open sockets or touch the filesystem: it depends on
//! `wraith-transport`'s `Channel`/`Signaling`/`Sink` contracts and
//! `wraith-crypto`'s session crypto, and is driven by a host application
//! (the `wraith-cli` binary, or any other embedder).

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod congestion;
pub mod engine;
pub mod error;
pub mod frame;
pub mod manifest;
pub mod reorder;

pub use congestion::{CongestionController, Mode as CongestionMode};
pub use error::Error;
pub use frame::{Frame, FrameBuilder, FrameHeader, END_OF_STREAM};
pub use manifest::{ControlMessage, FileEntry, Manifest};
pub use reorder::ReorderBuffer;

/// Fixed wire frame header size in bytes.
pub const FRAME_HEADER_SIZE: usize = 22;

/// Maximum number of peers a coordinator streams to directly in one batch.
pub const MAX_DIRECT_PEERS: usize = 3;

/// How long the coordinator waits for more peers to reach readiness before
/// starting a batch with whoever is ready.
pub const BATCH_READINESS_WINDOW: std::time::Duration = std::time::Duration::from_secs(10);
