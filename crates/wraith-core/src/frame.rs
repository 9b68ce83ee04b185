//! Wire frame encoding and decoding.
//!
//! Every frame carries a fixed 22-byte little-endian header followed by its
//! payload. In plaintext mode the header's `integrity_tag` is a CRC32-IEEE
//! checksum of the payload; in encrypted mode the tag is unused (zeroed) and
//! integrity is carried by the AEAD tag appended to the payload instead. A
//! frame with `file_index == END_OF_STREAM` marks the end of the logical
//! stream and carries no payload.

use crate::FRAME_HEADER_SIZE;
use crate::error::FrameError;

/// `file_index` value reserved to mark end-of-stream.
pub const END_OF_STREAM: u16 = 0xFFFF;

/// Wire frame header: 22 bytes, little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Index of the file this frame belongs to within the manifest, or
    /// [`END_OF_STREAM`].
    pub file_index: u16,
    /// Monotonically increasing sequence number for this batch.
    pub sequence: u32,
    /// Byte offset within the logical stream this frame's payload starts at.
    pub offset: u64,
    /// Length of the payload following this header, in bytes.
    pub data_length: u32,
    /// CRC32-IEEE of the payload in plaintext mode; zero in encrypted mode.
    pub integrity_tag: u32,
}

impl FrameHeader {
    /// Serialize the header to its 22-byte wire form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut buf = [0u8; FRAME_HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.file_index.to_le_bytes());
        buf[2..6].copy_from_slice(&self.sequence.to_le_bytes());
        buf[6..14].copy_from_slice(&self.offset.to_le_bytes());
        buf[14..18].copy_from_slice(&self.data_length.to_le_bytes());
        buf[18..22].copy_from_slice(&self.integrity_tag.to_le_bytes());
        buf
    }

    /// Parse a header from its 22-byte wire form.
    ///
    /// # Errors
    ///
    /// Returns `FrameError::TooShort` if fewer than 22 bytes are supplied.
    pub fn from_bytes(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < FRAME_HEADER_SIZE {
            return Err(FrameError::TooShort {
                expected: FRAME_HEADER_SIZE,
                actual: data.len(),
            });
        }
        Ok(Self {
            file_index: u16::from_le_bytes([data[0], data[1]]),
            sequence: u32::from_le_bytes([data[2], data[3], data[4], data[5]]),
            offset: u64::from_le_bytes([
                data[6], data[7], data[8], data[9], data[10], data[11], data[12], data[13],
            ]),
            data_length: u32::from_le_bytes([data[14], data[15], data[16], data[17]]),
            integrity_tag: u32::from_le_bytes([data[18], data[19], data[20], data[21]]),
        })
    }

    /// Whether this header marks end-of-stream.
    #[must_use]
    pub fn is_eos(&self) -> bool {
        self.file_index == END_OF_STREAM
    }
}

/// CRC32-IEEE (reflected, polynomial 0xEDB88320) of `data`.
#[must_use]
pub fn crc32_ieee(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// A parsed frame: header plus a zero-copy view of its payload.
#[derive(Debug)]
pub struct Frame<'a> {
    header: FrameHeader,
    payload: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Parse a frame out of `data` (zero-copy: `payload()` borrows from `data`).
    ///
    /// # Errors
    ///
    /// Returns `FrameError::TooShort` if `data` is smaller than the header.
    /// Returns `FrameError::PayloadOverflow` if the declared `data_length`
    /// does not exactly account for every byte in `data` after the header
    /// (short payloads and trailing garbage are both rejected).
    pub fn parse(data: &'a [u8]) -> Result<Self, FrameError> {
        let header = FrameHeader::from_bytes(data)?;
        let end = FRAME_HEADER_SIZE + header.data_length as usize;
        if end != data.len() {
            return Err(FrameError::PayloadOverflow);
        }
        Ok(Self {
            header,
            payload: &data[FRAME_HEADER_SIZE..end],
        })
    }

    /// The parsed header.
    #[must_use]
    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    /// The frame's payload bytes.
    #[must_use]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Verify the plaintext CRC32 integrity tag against the payload.
    ///
    /// Only meaningful in plaintext mode; encrypted-mode frames carry their
    /// integrity guarantee in the AEAD tag appended to the ciphertext and
    /// should not call this.
    #[must_use]
    pub fn verify_crc(&self) -> bool {
        crc32_ieee(self.payload) == self.header.integrity_tag
    }
}

/// Builds wire frames header-first.
#[derive(Default)]
pub struct FrameBuilder {
    file_index: u16,
    sequence: u32,
    offset: u64,
    payload: Vec<u8>,
}

impl FrameBuilder {
    /// Start a new frame builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the file index (or [`END_OF_STREAM`]).
    #[must_use]
    pub fn file_index(mut self, index: u16) -> Self {
        self.file_index = index;
        self
    }

    /// Set the sequence number.
    #[must_use]
    pub fn sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    /// Set the stream offset.
    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Set the payload. In plaintext mode this is the chunk bytes; in
    /// encrypted mode this is the AEAD ciphertext (including tag).
    #[must_use]
    pub fn payload(mut self, data: &[u8]) -> Self {
        self.payload = data.to_vec();
        self
    }

    /// Build a plaintext frame: `integrity_tag` is the CRC32 of the payload.
    ///
    /// # Panics
    ///
    /// Panics if the payload exceeds `u32::MAX` bytes.
    #[must_use]
    pub fn build_plaintext(self) -> Vec<u8> {
        let data_length =
            u32::try_from(self.payload.len()).expect("payload larger than u32::MAX");
        let header = FrameHeader {
            file_index: self.file_index,
            sequence: self.sequence,
            offset: self.offset,
            data_length,
            integrity_tag: crc32_ieee(&self.payload),
        };
        let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&header.to_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Build an encrypted frame: `payload` is assumed to already be sealed
    /// AEAD ciphertext, and `integrity_tag` is left at zero.
    ///
    /// # Panics
    ///
    /// Panics if the payload exceeds `u32::MAX` bytes.
    #[must_use]
    pub fn build_encrypted(self) -> Vec<u8> {
        let data_length =
            u32::try_from(self.payload.len()).expect("payload larger than u32::MAX");
        let header = FrameHeader {
            file_index: self.file_index,
            sequence: self.sequence,
            offset: self.offset,
            data_length,
            integrity_tag: 0,
        };
        let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&header.to_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Build the end-of-stream marker frame (no payload).
    #[must_use]
    pub fn build_eos(sequence: u32) -> Vec<u8> {
        FrameHeader {
            file_index: END_OF_STREAM,
            sequence,
            offset: 0,
            data_length: 0,
            integrity_tag: 0,
        }
        .to_bytes()
        .to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = FrameHeader {
            file_index: 3,
            sequence: 1000,
            offset: 65536,
            data_length: 128,
            integrity_tag: 0xDEAD_BEEF,
        };
        let bytes = header.to_bytes();
        assert_eq!(FrameHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn plaintext_frame_roundtrip_and_crc() {
        let payload = b"hello wraith-warp";
        let bytes = FrameBuilder::new()
            .file_index(1)
            .sequence(7)
            .offset(0)
            .payload(payload)
            .build_plaintext();

        let frame = Frame::parse(&bytes).unwrap();
        assert_eq!(frame.header().file_index, 1);
        assert_eq!(frame.header().sequence, 7);
        assert_eq!(frame.payload(), payload);
        assert!(frame.verify_crc());
    }

    #[test]
    fn corrupted_payload_fails_crc() {
        let mut bytes = FrameBuilder::new().payload(b"abc").build_plaintext();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let frame = Frame::parse(&bytes).unwrap();
        assert!(!frame.verify_crc());
    }

    #[test]
    fn eos_frame_has_no_payload() {
        let bytes = FrameBuilder::build_eos(42);
        let frame = Frame::parse(&bytes).unwrap();
        assert!(frame.header().is_eos());
        assert_eq!(frame.payload().len(), 0);
    }

    #[test]
    fn too_short_is_rejected() {
        let short = [0u8; 10];
        assert!(matches!(
            Frame::parse(&short),
            Err(FrameError::TooShort { .. })
        ));
    }

    #[test]
    fn payload_overflow_is_rejected() {
        let mut bytes = FrameBuilder::new().payload(b"test").build_plaintext();
        bytes[14] = 0xFF;
        bytes[15] = 0xFF;
        bytes[16] = 0xFF;
        bytes[17] = 0xFF;
        assert!(matches!(
            Frame::parse(&bytes),
            Err(FrameError::PayloadOverflow)
        ));
    }

    #[test]
    fn trailing_garbage_after_declared_payload_is_rejected() {
        let mut bytes = FrameBuilder::new().payload(b"test").build_plaintext();
        bytes.extend_from_slice(b"extra");
        assert!(matches!(
            Frame::parse(&bytes),
            Err(FrameError::PayloadOverflow)
        ));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_parse_doesnt_panic(data in prop::collection::vec(any::<u8>(), 0..2048)) {
                let _ = Frame::parse(&data);
            }

            #[test]
            fn prop_roundtrip_preserves_data(
                file_index in 0u16..=0xFFFEu16,
                sequence in any::<u32>(),
                offset in any::<u64>(),
                payload in prop::collection::vec(any::<u8>(), 0..1024),
            ) {
                let bytes = FrameBuilder::new()
                    .file_index(file_index)
                    .sequence(sequence)
                    .offset(offset)
                    .payload(&payload)
                    .build_plaintext();

                let frame = Frame::parse(&bytes).unwrap();
                prop_assert_eq!(frame.header().file_index, file_index);
                prop_assert_eq!(frame.header().sequence, sequence);
                prop_assert_eq!(frame.header().offset, offset);
                prop_assert_eq!(frame.payload(), payload.as_slice());
                prop_assert!(frame.verify_crc());
            }

            #[test]
            fn prop_eos_sentinel_always_recognized(sequence in any::<u32>()) {
                let bytes = FrameBuilder::build_eos(sequence);
                let frame = Frame::parse(&bytes).unwrap();
                prop_assert!(frame.header().is_eos());
            }
        }
    }
}
