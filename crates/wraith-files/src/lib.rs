//! # wraith-warp files
//!
//! Source and sink pipelines that sit between the manifest and the wire:
//! chunking files for the sender, and writing received bytes back to disk
//! for the receiver.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod sink;
pub mod source;

pub use sink::FilesystemSink;
pub use source::{SourceFile, run_archive_stream, run_single_stream};
pub use wraith_core::engine::SourceChunk;
pub use wraith_transport::{Sink, SinkError};
