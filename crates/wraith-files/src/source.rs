//! Source pipelines: turn files on disk into a sequence of `(file_index,
//! offset, bytes)` chunks for the sender engine to frame and seal.
//!
//! Two modes, selected by the manifest's `archive_mode`:
//! - single-stream: each file is read and chunked independently, in
//!   manifest order.
//! - archive-stream: all files are concatenated on the fly into one logical
//!   stream (optionally deflated), addressed as `file_index = 0`.
//!
//! Both modes run a producer task that reads ahead of the sender and
//! buffers chunks in a bounded queue, so a slow sender never idles the
//! sender engine waiting on disk I/O, and a fast disk never grows memory
//! unbounded.

use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use wraith_core::engine::SourceChunk;

/// Chunk size is clamped to this range regardless of what the congestion
/// controller requests.
pub const MIN_CHUNK_SIZE: usize = 16 * 1024;
/// Upper clamp for chunk size.
pub const MAX_CHUNK_SIZE: usize = 64 * 1024;

/// High-water mark for the single-stream prefetch buffer, in bytes.
pub const PREFETCH_HIGH_WATER: usize = 8 * 1024 * 1024;
/// Low-water mark: the producer resumes once the buffer drains below this.
pub const PREFETCH_LOW_WATER: usize = 2 * 1024 * 1024;
/// High-water mark for the archive-stream queue.
pub const ARCHIVE_HIGH_WATER: usize = 32 * 1024 * 1024;
/// Low-water mark for the archive-stream queue.
pub const ARCHIVE_LOW_WATER: usize = 8 * 1024 * 1024;

/// How long the archive producer sleeps between polls while waiting for the
/// outstanding queue to drain below `ARCHIVE_LOW_WATER`.
const ARCHIVE_DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// One file to be read by a source pipeline.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Manifest file index.
    pub file_index: u16,
    /// Path on disk.
    pub path: PathBuf,
}

fn clamp_chunk_size(requested: usize) -> usize {
    requested.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE)
}

/// Reads files sequentially in manifest order, chunked at `chunk_size`
/// bytes (clamped), and sends them to `tx`. Applies backpressure against
/// `high_water`/`low_water`: once the channel's estimated outstanding bytes
/// crosses `high_water` the producer awaits until a consumer signal drops it
/// back below `low_water`.
///
/// # Errors
///
/// Returns an `io::Error` if a file cannot be opened or read.
pub async fn run_single_stream(
    files: Vec<SourceFile>,
    chunk_size: usize,
    tx: mpsc::Sender<SourceChunk>,
) -> io::Result<()> {
    let chunk_size = clamp_chunk_size(chunk_size);
    for file in files {
        let mut reader = BufReader::new(File::open(&file.path).await?);
        let mut offset: u64 = 0;
        loop {
            let mut buf = vec![0u8; chunk_size];
            let n = read_up_to(&mut reader, &mut buf).await?;
            if n == 0 {
                break;
            }
            buf.truncate(n);
            if tx
                .send(SourceChunk {
                    file_index: file.file_index,
                    offset,
                    data: buf,
                })
                .await
                .is_err()
            {
                return Ok(());
            }
            offset += n as u64;
        }
    }
    Ok(())
}

async fn read_up_to<R: AsyncReadExt + Unpin>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = reader.read(&mut buf[total..]).await?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

/// Streams every file in `files` concatenated into one logical stream under
/// `file_index = 0`, optionally deflating (level 6) before chunking.
/// Produced chunks are addressed by offset into the post-compression (or raw
/// concatenated, if `compress` is false) byte stream.
///
/// Files are read incrementally, `chunk_size` bytes at a time, rather than
/// loaded whole: a single file in the folder can be arbitrarily large
/// without the producer's memory use growing past a few queued chunks. The
/// producer also polls `tx`'s outstanding queue depth against
/// [`ARCHIVE_HIGH_WATER`]/[`ARCHIVE_LOW_WATER`] between reads, pausing disk
/// I/O while the sender side is still working through a backlog.
///
/// # Errors
///
/// Returns an `io::Error` if a file cannot be opened, read, or if deflate
/// encoding fails.
pub async fn run_archive_stream(
    files: Vec<SourceFile>,
    chunk_size: usize,
    compress: bool,
    tx: mpsc::Sender<SourceChunk>,
) -> io::Result<()> {
    let chunk_size = clamp_chunk_size(chunk_size);
    let mut offset: u64 = 0;
    let mut pending = Vec::with_capacity(chunk_size);

    for file in files {
        let mut reader = BufReader::new(File::open(&file.path).await?);
        let mut encoder = compress.then(|| DeflateEncoder::new(Vec::new(), Compression::new(6)));

        loop {
            await_queue_drain(&tx, chunk_size).await;

            let mut raw = vec![0u8; chunk_size];
            let n = read_up_to(&mut reader, &mut raw).await?;
            if n == 0 {
                break;
            }
            raw.truncate(n);

            if let Some(encoder) = encoder.as_mut() {
                encoder.write_all(&raw)?;
                pending.extend(encoder.get_ref());
                encoder.get_mut().clear();
            } else {
                pending.extend(raw);
            }

            if !flush_full_chunks(&tx, &mut pending, chunk_size, &mut offset).await {
                return Ok(());
            }
        }

        if let Some(encoder) = encoder {
            pending.extend(encoder.finish()?);
        }
    }

    if !flush_full_chunks(&tx, &mut pending, chunk_size, &mut offset).await {
        return Ok(());
    }
    if !pending.is_empty() {
        let _ = tx
            .send(SourceChunk {
                file_index: 0,
                offset,
                data: pending,
            })
            .await;
    }
    Ok(())
}

/// Drains `pending` in `chunk_size`-sized pieces, sending each to `tx`.
/// Returns `false` once the receiver has hung up, signalling the caller to
/// stop producing.
async fn flush_full_chunks(
    tx: &mpsc::Sender<SourceChunk>,
    pending: &mut Vec<u8>,
    chunk_size: usize,
    offset: &mut u64,
) -> bool {
    while pending.len() >= chunk_size {
        let chunk: Vec<u8> = pending.drain(..chunk_size).collect();
        if tx
            .send(SourceChunk {
                file_index: 0,
                offset: *offset,
                data: chunk,
            })
            .await
            .is_err()
        {
            return false;
        }
        *offset += chunk_size as u64;
    }
    true
}

/// Pauses while the channel's outstanding queue, estimated from its unused
/// capacity, is still above [`ARCHIVE_HIGH_WATER`], resuming once it drains
/// below [`ARCHIVE_LOW_WATER`].
async fn await_queue_drain(tx: &mpsc::Sender<SourceChunk>, chunk_size: usize) {
    let outstanding = |tx: &mpsc::Sender<SourceChunk>| {
        (tx.max_capacity().saturating_sub(tx.capacity())) as u64 * chunk_size as u64
    };

    if outstanding(tx) < ARCHIVE_HIGH_WATER as u64 {
        return;
    }
    while outstanding(tx) >= ARCHIVE_LOW_WATER as u64 {
        tokio::time::sleep(ARCHIVE_DRAIN_POLL_INTERVAL).await;
    }
}
