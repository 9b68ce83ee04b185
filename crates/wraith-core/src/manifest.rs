//! Transfer manifest and the JSON control-message envelope interleaved with
//! binary frames on the same channel.

use serde::{Deserialize, Serialize};

/// One file offered in a transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    /// Index of this file within the manifest; matches `FrameHeader::file_index`.
    pub id: u16,
    /// Display name (not a filesystem path).
    pub name: String,
    /// Relative path to reconstruct on the receiver side.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// MIME type, best-effort.
    pub mime: Option<String>,
    /// Source modification time, Unix seconds.
    pub mtime: Option<i64>,
}

/// Describes the whole transfer: every file, in the order they will be
/// streamed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Transfer identifier, `warp_` prefixed.
    pub transfer_id: String,
    /// Display name for the thing being sent: the single file's name, or
    /// the folder name when `is_folder` is set. Not a filesystem path and
    /// not derivable from `files` alone once a folder has been renamed on
    /// the sink side.
    pub root_name: String,
    /// Total size in bytes across all files, computed once at manifest
    /// build time rather than re-summed by every consumer.
    pub total_size: u64,
    /// Number of files in the transfer.
    pub total_files: u32,
    /// Whether this transfer represents a folder (more than one file) as
    /// opposed to a single file sent on its own. Independent of
    /// `archive_mode`: a lone file sent with `--archive` is still not a
    /// folder.
    pub is_folder: bool,
    /// Files in streaming order.
    pub files: Vec<FileEntry>,
    /// Whether files are streamed individually or as a single archive.
    pub archive_mode: bool,
}

impl Manifest {
    /// Build a manifest from its files, deriving `total_size`, `total_files`
    /// and `is_folder` rather than requiring every call site to keep them in
    /// sync by hand.
    #[must_use]
    pub fn new(
        transfer_id: String,
        root_name: String,
        files: Vec<FileEntry>,
        archive_mode: bool,
    ) -> Self {
        let total_size = files.iter().map(|f| f.size).sum();
        let total_files = u32::try_from(files.len()).unwrap_or(u32::MAX);
        Self {
            transfer_id,
            root_name,
            total_size,
            total_files,
            is_folder: files.len() > 1,
            files,
            archive_mode,
        }
    }

    /// Total size in bytes across all files. Kept alongside the `total_size`
    /// field for call sites that only have a `&Manifest` and want the
    /// accessor spelling.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// BLAKE3 fingerprint of the canonical JSON encoding, used by receivers
    /// to detect a manifest re-send mismatch during idempotent re-delivery.
    ///
    /// # Panics
    ///
    /// Panics if the manifest cannot be serialized, which cannot happen for
    /// this type.
    #[must_use]
    pub fn fingerprint(&self) -> [u8; 32] {
        let encoded = serde_json::to_vec(self).expect("Manifest always serializes");
        *blake3::hash(&encoded).as_bytes()
    }
}

/// Control messages interleaved with binary frames on the same channel.
/// Disambiguated from binary frames at the receiver boundary via the
/// sentinel-byte heuristic: a leading `{` or `[` is JSON, anything else is
/// the first byte of a binary frame's little-endian `file_index`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Sent once per batch member at batch start.
    #[serde(rename = "MANIFEST")]
    Manifest {
        /// The manifest itself.
        manifest: Manifest,
        /// BLAKE3 fingerprint of `manifest`, for idempotent re-send detection.
        manifest_hash: String,
    },
    /// Sent by a receiver once it has allocated its sink and is ready for
    /// frames.
    #[serde(rename = "TRANSFER_READY")]
    TransferReady {
        /// Transfer this readiness applies to.
        transfer_id: String,
    },
    /// Sent by the coordinator to every member of a batch once it starts
    /// streaming.
    #[serde(rename = "TRANSFER_STARTED")]
    TransferStarted {
        /// Transfer this applies to.
        transfer_id: String,
    },
    /// Sent to peers who were ready but excluded because the batch started
    /// without waiting for them (they are queued for the next batch).
    #[serde(rename = "TRANSFER_STARTED_WITHOUT_YOU")]
    TransferStartedWithoutYou {
        /// Transfer this applies to.
        transfer_id: String,
    },
    /// Sent to a peer placed in the queue for a future batch.
    #[serde(rename = "QUEUED")]
    Queued {
        /// Transfer this applies to.
        transfer_id: String,
        /// 1-based position in the queue.
        position: u32,
    },
    /// Sent to a queued peer once a batch slot frees up for it.
    #[serde(rename = "READY_FOR_DOWNLOAD")]
    ReadyForDownload {
        /// Transfer this applies to.
        transfer_id: String,
    },
    /// Sent by a receiver once every file in the manifest has been written
    /// and verified.
    #[serde(rename = "DOWNLOAD_COMPLETE")]
    DownloadComplete {
        /// Transfer this applies to.
        transfer_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manifest() -> Manifest {
        Manifest::new(
            "warp_abc123".into(),
            "report.pdf".into(),
            vec![FileEntry {
                id: 0,
                name: "report.pdf".into(),
                path: "report.pdf".into(),
                size: 4096,
                mime: Some("application/pdf".into()),
                mtime: Some(1_700_000_000),
            }],
            false,
        )
    }

    #[test]
    fn total_size_sums_files() {
        let manifest = sample_manifest();
        assert_eq!(manifest.total_size(), 4096);
        assert_eq!(manifest.total_files, 1);
        assert!(!manifest.is_folder);
    }

    #[test]
    fn wire_json_uses_camel_case_field_names() {
        let manifest = sample_manifest();
        let json = serde_json::to_string(&manifest).unwrap();
        assert!(json.contains("\"rootName\":\"report.pdf\""));
        assert!(json.contains("\"totalSize\":4096"));
        assert!(json.contains("\"totalFiles\":1"));
        assert!(json.contains("\"isFolder\":false"));
    }

    #[test]
    fn fingerprint_is_stable() {
        let manifest = sample_manifest();
        assert_eq!(manifest.fingerprint(), manifest.fingerprint());
    }

    #[test]
    fn control_message_roundtrips_through_json() {
        let msg = ControlMessage::Queued {
            transfer_id: "warp_abc123".into(),
            position: 2,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.starts_with('{'));
        let parsed: ControlMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn manifest_message_carries_fingerprint() {
        let manifest = sample_manifest();
        let msg = ControlMessage::Manifest {
            manifest_hash: hex::encode(manifest.fingerprint()),
            manifest,
        };
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: ControlMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }
}
