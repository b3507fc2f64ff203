//! Wire framing.
//!
//! This module contains:
//! - [`codec`]: the 8-byte header + payload + checksum frame format
//! - [`fragmentation`]: chunking of payloads larger than one datagram and
//!   reassembly of out-of-order chunks
//!
//! # Frame Format
//!
//! ```text
//! offset 0       : 0x2A (magic)
//! offset 1       : message class (0x01 cmd, 0x02 info, 0x03 ack)
//! offset 2       : subtype (class-scoped)
//! offset 3..6    : big-endian u32 sender timestamp (ms)
//! offset 7       : payload-type tag (0x00..0x07)
//! offset 8..N-2  : payload
//! offset N-1     : checksum = sum(bytes[0..N-1]) mod 256
//! ```
//!
//! When the tag is `0x07` the payload starts with a 3-byte chunk header:
//! `[chunk_index][total_chunks][inner_tag]`.

mod codec;
mod fragmentation;

pub use codec::{checksum, decode, encode, encode_frame, Chunk, Frame, FrameBody, Header};
pub use fragmentation::{Fragmenter, Reassembled, Reassembler, ReassemblyConfig};

/// Protocol identifier at offset 0.
pub const MAGIC: u8 = 0x2A;

/// Header size in bytes (magic + class + subtype + timestamp + tag).
pub const HEADER_SIZE: usize = 8;

/// Trailing checksum size in bytes.
pub const CHECKSUM_SIZE: usize = 1;

/// Smallest well-formed frame: a header, no payload, a checksum.
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + CHECKSUM_SIZE;

/// Largest datagram the transport accepts.
pub const MAX_FRAME_SIZE: usize = 250;

/// Largest payload that fits in one frame. Anything longer is fragmented.
pub const MAX_SINGLE_PAYLOAD: usize = MAX_FRAME_SIZE - MIN_FRAME_SIZE;

/// Chunk header size (index + total + inner tag).
pub const CHUNK_HEADER_SIZE: usize = 3;

/// Largest slice of the logical payload carried by one chunk.
pub const MAX_CHUNK_PAYLOAD: usize = MAX_SINGLE_PAYLOAD - CHUNK_HEADER_SIZE;

/// Largest chunk count expressible in the one-byte `total_chunks` field.
pub const MAX_CHUNKS: usize = u8::MAX as usize;

/// Reasons an inbound datagram is dropped.
///
/// None of these propagate past the node's receive path: the link is
/// unreliable, so corrupted or foreign datagrams are logged and discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bytes than a header plus checksum.
    TooShort { len: usize },
    /// First byte is not [`MAGIC`].
    BadMagic(u8),
    /// Trailing byte does not match the recomputed checksum.
    ChecksumMismatch { expected: u8, actual: u8 },
    /// Class byte is not command, info or ack.
    UnknownClass(u8),
    /// Payload-type byte outside `0x00..=0x07`.
    UnknownPayloadTag(u8),
    /// Chunk header is truncated or inconsistent.
    InvalidChunk(&'static str),
    /// Payload bytes do not match their tag.
    InvalidPayload(&'static str),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort { len } => {
                write!(f, "frame too short: {} bytes (min {})", len, MIN_FRAME_SIZE)
            }
            Self::BadMagic(byte) => write!(f, "bad magic byte 0x{:02X}", byte),
            Self::ChecksumMismatch { expected, actual } => write!(
                f,
                "checksum mismatch: expected 0x{:02X}, got 0x{:02X}",
                expected, actual
            ),
            Self::UnknownClass(byte) => write!(f, "unknown message class 0x{:02X}", byte),
            Self::UnknownPayloadTag(byte) => write!(f, "unknown payload tag 0x{:02X}", byte),
            Self::InvalidChunk(msg) => write!(f, "invalid chunk: {}", msg),
            Self::InvalidPayload(msg) => write!(f, "invalid payload: {}", msg),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Errors on the send side. These are caller errors, not link errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Payload needs more chunks than the wire format can count.
    TooManyChunks { needed: usize, max: usize },
    /// A single frame was asked to carry more than [`MAX_SINGLE_PAYLOAD`].
    PayloadTooLarge { len: usize, max: usize },
    /// Output buffer too small for the frame.
    BufferTooSmall { needed: usize, available: usize },
    /// Chunk size outside `1..=MAX_CHUNK_PAYLOAD`.
    InvalidChunkSize(usize),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooManyChunks { needed, max } => {
                write!(f, "payload needs {} chunks (max {})", needed, max)
            }
            Self::PayloadTooLarge { len, max } => {
                write!(f, "payload of {} bytes does not fit one frame (max {})", len, max)
            }
            Self::BufferTooSmall { needed, available } => write!(
                f,
                "buffer too small for frame: need {} bytes, have {}",
                needed, available
            ),
            Self::InvalidChunkSize(size) => write!(
                f,
                "chunk size {} outside 1..={}",
                size, MAX_CHUNK_PAYLOAD
            ),
        }
    }
}

impl std::error::Error for EncodeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_constants() {
        assert_eq!(MIN_FRAME_SIZE, 9);
        assert_eq!(MAX_SINGLE_PAYLOAD, 241);
        assert_eq!(MAX_CHUNK_PAYLOAD, 238);
        assert_eq!(HEADER_SIZE + CHUNK_HEADER_SIZE + MAX_CHUNK_PAYLOAD + CHECKSUM_SIZE, MAX_FRAME_SIZE);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            DecodeError::TooShort { len: 3 }.to_string(),
            "frame too short: 3 bytes (min 9)"
        );
        assert_eq!(DecodeError::BadMagic(0x2B).to_string(), "bad magic byte 0x2B");
        assert_eq!(
            EncodeError::TooManyChunks { needed: 300, max: 255 }.to_string(),
            "payload needs 300 chunks (max 255)"
        );
    }
}
