//! Sink pipeline: positional writes into reconstructed files.
//!
//! A `Sink` is initialized against a manifest before any frames flow; if
//! initialization fails (e.g. the output directory cannot be created), the
//! transfer aborts before the first frame is accepted. Once running, writes
//! are addressed by `(file_index, offset)` and may arrive out of order
//! (the reorder buffer upstream only guarantees in-order delivery within
//! the window it can hold, not globally); late frames that arrive after
//! end-of-stream are still accepted until all outstanding writes for that
//! file have drained.
//!
//! In archive mode every manifest file is still pre-allocated individually
//! under `output_dir`, but frames all arrive addressed at `file_index = 0`
//! against one logical, optionally-deflated stream. [`ArchiveState`]
//! inflates that stream incrementally and demultiplexes the plaintext back
//! into the manifest's files by cumulative size, in manifest order.

use async_trait::async_trait;
use flate2::write::DeflateDecoder;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use wraith_core::manifest::{FileEntry, Manifest};
use wraith_transport::{Sink, SinkError};

/// Inflation and demultiplexing state for the single logical stream an
/// archive-mode transfer writes at `file_index = 0`.
struct ArchiveState {
    decoder: Option<DeflateDecoder<Vec<u8>>>,
    /// Next byte offset expected in the incoming (possibly compressed)
    /// stream; the reorder buffer upstream guarantees contiguous delivery,
    /// so a mismatch here means a gap or a replay, not normal reordering.
    next_stream_offset: u64,
    /// Manifest files in streaming order, with a running cursor into them.
    order: Vec<FileEntry>,
    cursor: usize,
    bytes_in_current: u64,
}

impl ArchiveState {
    fn new(order: Vec<FileEntry>, compress: bool) -> Self {
        Self {
            decoder: compress.then(|| DeflateDecoder::new(Vec::new())),
            next_stream_offset: 0,
            order,
            cursor: 0,
            bytes_in_current: 0,
        }
    }

    /// Inflate (if compressed) the next slice of the archive stream and
    /// return the plaintext bytes it decoded to.
    fn inflate(&mut self, data: &[u8]) -> io::Result<Vec<u8>> {
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(data.to_vec());
        };
        decoder.write_all(data)?;
        let out = decoder.get_ref().clone();
        decoder.get_mut().clear();
        Ok(out)
    }

    /// Split `plain` across manifest file boundaries, yielding
    /// `(file_id, offset_in_file, slice)` for each destination write.
    fn demux<'a>(&mut self, mut plain: &'a [u8]) -> Vec<(u16, u64, &'a [u8])> {
        let mut writes = Vec::new();
        while !plain.is_empty() && self.cursor < self.order.len() {
            let entry = &self.order[self.cursor];
            let remaining = entry.size - self.bytes_in_current;
            if remaining == 0 {
                self.cursor += 1;
                self.bytes_in_current = 0;
                continue;
            }
            let take = remaining.min(plain.len() as u64) as usize;
            let (chunk, rest) = plain.split_at(take);
            writes.push((entry.id, self.bytes_in_current, chunk));
            self.bytes_in_current += take as u64;
            plain = rest;
        }
        writes
    }
}

/// A `Sink` that writes each manifest file to its own path under an output
/// directory. In archive mode, incoming frames carry one concatenated
/// (optionally deflated) stream which is inflated and demultiplexed back
/// into those same per-file paths.
pub struct FilesystemSink {
    files: HashMap<u16, Mutex<File>>,
    archive: Option<Mutex<ArchiveState>>,
}

impl FilesystemSink {
    /// Create a filesystem sink, pre-allocating every file named in
    /// `manifest` under `output_dir`. `compress` must match the `compress`
    /// flag the corresponding `run_archive_stream` call on the sending side
    /// used; it is ignored outside archive mode.
    ///
    /// # Errors
    ///
    /// Returns `SinkError::Init` if `output_dir` cannot be created or any
    /// file cannot be opened/pre-allocated.
    pub async fn new(
        manifest: &Manifest,
        output_dir: &Path,
        compress: bool,
    ) -> Result<Self, SinkError> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| SinkError::Init(e.to_string()))?;

        let mut files = HashMap::new();
        for entry in &manifest.files {
            let path = output_dir.join(&entry.path);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| SinkError::Init(e.to_string()))?;
            }
            let file = open_preallocated(&path, entry.size)
                .await
                .map_err(|e| SinkError::Init(e.to_string()))?;
            files.insert(entry.id, Mutex::new(file));
        }

        let archive = manifest
            .archive_mode
            .then(|| Mutex::new(ArchiveState::new(manifest.files.clone(), compress)));

        Ok(Self { files, archive })
    }

    async fn write_archive(&self, offset: u64, data: &[u8]) -> Result<(), SinkError> {
        let archive = self.archive.as_ref().expect("archive mode");
        let mut state = archive.lock().await;
        if offset != state.next_stream_offset {
            return Err(SinkError::Io(format!(
                "archive stream offset mismatch: expected {}, got {offset}",
                state.next_stream_offset
            )));
        }
        state.next_stream_offset += data.len() as u64;

        let plain = state.inflate(data).map_err(|e| SinkError::Io(e.to_string()))?;
        for (id, file_offset, chunk) in state.demux(&plain) {
            let file = self.files.get(&id).ok_or(SinkError::UnknownFile(id))?;
            write_chunk(file, file_offset, chunk).await?;
        }
        Ok(())
    }
}

async fn write_chunk(file: &Mutex<File>, offset: u64, data: &[u8]) -> Result<(), SinkError> {
    let mut guard = file.lock().await;
    guard
        .seek(std::io::SeekFrom::Start(offset))
        .await
        .map_err(|e| SinkError::Io(e.to_string()))?;
    guard
        .write_all(data)
        .await
        .map_err(|e| SinkError::Io(e.to_string()))?;
    Ok(())
}

async fn open_preallocated(path: &Path, size: u64) -> io::Result<File> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .await?;
    file.set_len(size).await?;
    Ok(file)
}

#[async_trait]
impl Sink for FilesystemSink {
    async fn write_at(&self, file_index: u16, offset: u64, data: &[u8]) -> Result<(), SinkError> {
        if self.archive.is_some() {
            return self.write_archive(offset, data).await;
        }
        let file = self
            .files
            .get(&file_index)
            .ok_or(SinkError::UnknownFile(file_index))?;
        write_chunk(file, offset, data).await
    }

    async fn finalize(&self) -> Result<(), SinkError> {
        for file in self.files.values() {
            file.lock()
                .await
                .flush()
                .await
                .map_err(|e| SinkError::Io(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use tempfile::tempdir;

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

    fn two_file_manifest() -> Manifest {
        Manifest::new(
            "warp_test".into(),
            "bundle".into(),
            vec![
                FileEntry {
                    id: 0,
                    name: "a".into(),
                    path: "x/a".into(),
                    size: 100,
                    mime: None,
                    mtime: None,
                },
                FileEntry {
                    id: 1,
                    name: "b".into(),
                    path: "x/b".into(),
                    size: 200,
                    mime: None,
                    mtime: None,
                },
            ],
            true,
        )
    }

    #[tokio::test]
    async fn out_of_order_writes_land_correctly() {
        let dir = tempdir().unwrap();
        let sink = FilesystemSink::new(&manifest(), dir.path(), false)
            .await
            .unwrap();
        sink.write_at(0, 3, b"def").await.unwrap();
        sink.write_at(0, 0, b"abc").await.unwrap();
        sink.finalize().await.unwrap();

        let contents = tokio::fs::read(dir.path().join("a.bin")).await.unwrap();
        assert_eq!(contents, b"abcdef");
    }

    #[tokio::test]
    async fn unknown_file_index_is_rejected() {
        let dir = tempdir().unwrap();
        let sink = FilesystemSink::new(&manifest(), dir.path(), false)
            .await
            .unwrap();
        assert!(matches!(
            sink.write_at(7, 0, b"x").await,
            Err(SinkError::UnknownFile(7))
        ));
    }

    #[tokio::test]
    async fn archive_mode_demuxes_uncompressed_stream_into_manifest_files() {
        let dir = tempdir().unwrap();
        let manifest = two_file_manifest();
        let sink = FilesystemSink::new(&manifest, dir.path(), false)
            .await
            .unwrap();

        let a = vec![0x11u8; 100];
        let b = vec![0x22u8; 200];
        let mut stream = a.clone();
        stream.extend_from_slice(&b);

        // Split the write into chunks that straddle the file boundary, the
        // way the chunked source pipeline would.
        for chunk in stream.chunks(64) {
            let offset = sink_offset(&stream, chunk);
            sink.write_at(0, offset, chunk).await.unwrap();
        }
        sink.finalize().await.unwrap();

        assert_eq!(tokio::fs::read(dir.path().join("x/a")).await.unwrap(), a);
        assert_eq!(tokio::fs::read(dir.path().join("x/b")).await.unwrap(), b);
    }

    #[tokio::test]
    async fn archive_mode_demuxes_compressed_stream_into_manifest_files() {
        let dir = tempdir().unwrap();
        let manifest = two_file_manifest();
        let sink = FilesystemSink::new(&manifest, dir.path(), true)
            .await
            .unwrap();

        let a = vec![0x11u8; 100];
        let b = vec![0x22u8; 200];
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(6));
        encoder.write_all(&a).unwrap();
        encoder.write_all(&b).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut offset = 0u64;
        for chunk in compressed.chunks(32) {
            sink.write_at(0, offset, chunk).await.unwrap();
            offset += chunk.len() as u64;
        }
        sink.finalize().await.unwrap();

        assert_eq!(tokio::fs::read(dir.path().join("x/a")).await.unwrap(), a);
        assert_eq!(tokio::fs::read(dir.path().join("x/b")).await.unwrap(), b);
    }

    /// Helper for the uncompressed demux test: byte offset of `chunk`
    /// within `stream`, via pointer arithmetic on the shared backing slice.
    fn sink_offset(stream: &[u8], chunk: &[u8]) -> u64 {
        (chunk.as_ptr() as usize - stream.as_ptr() as usize) as u64
    }
}
