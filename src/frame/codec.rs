//! Frame encoding and decoding.

use super::{
    DecodeError, EncodeError, Fragmenter, CHECKSUM_SIZE, CHUNK_HEADER_SIZE, HEADER_SIZE, MAGIC,
    MAX_SINGLE_PAYLOAD, MIN_FRAME_SIZE,
};
use crate::message::MessageKind;
use crate::payload::PayloadTag;

/// Decoded fixed header of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub kind: MessageKind,
    /// Sender's millisecond clock.
    pub timestamp: u32,
    /// Payload-type tag; [`PayloadTag::Long`] for chunks.
    pub tag: PayloadTag,
}

impl Header {
    pub fn new(kind: MessageKind, timestamp: u32, tag: PayloadTag) -> Self {
        Self {
            kind,
            timestamp,
            tag,
        }
    }

    fn write_to(&self, buf: &mut [u8]) {
        buf[0] = MAGIC;
        buf[1] = self.kind.class() as u8;
        buf[2] = self.kind.subtype();
        buf[3..7].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[7] = self.tag.as_u8();
    }
}

/// One piece of a fragmented logical message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based position within the logical message.
    pub index: u8,
    /// Number of chunks in the logical message.
    pub total: u8,
    /// Tag of the logical payload.
    pub inner_tag: PayloadTag,
    /// This chunk's slice of the logical payload.
    pub data: Vec<u8>,
}

impl Chunk {
    /// Parse the chunk header at the start of a `Long` payload.
    fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < CHUNK_HEADER_SIZE {
            return Err(DecodeError::InvalidChunk("truncated chunk header"));
        }
        let (index, total) = (bytes[0], bytes[1]);
        if total == 0 {
            return Err(DecodeError::InvalidChunk("zero total chunks"));
        }
        if index >= total {
            return Err(DecodeError::InvalidChunk("chunk index out of range"));
        }
        let inner_tag = PayloadTag::try_from(bytes[2])?;
        if inner_tag == PayloadTag::Long {
            return Err(DecodeError::InvalidChunk("nested fragmented payload"));
        }
        Ok(Self {
            index,
            total,
            inner_tag,
            data: bytes[CHUNK_HEADER_SIZE..].to_vec(),
        })
    }
}

/// Frame payload: either a whole logical payload or one chunk of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBody {
    Single(Vec<u8>),
    Chunk(Chunk),
}

/// A decoded physical frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: Header,
    pub body: FrameBody,
}

/// Sum of all bytes, mod 256.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Serialize one physical frame into the provided buffer.
///
/// Returns the number of bytes written. The payload must fit one frame.
pub fn encode_frame(header: &Header, payload: &[u8], buf: &mut [u8]) -> Result<usize, EncodeError> {
    if payload.len() > MAX_SINGLE_PAYLOAD {
        return Err(EncodeError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_SINGLE_PAYLOAD,
        });
    }
    let total_len = HEADER_SIZE + payload.len() + CHECKSUM_SIZE;
    if buf.len() < total_len {
        return Err(EncodeError::BufferTooSmall {
            needed: total_len,
            available: buf.len(),
        });
    }
    header.write_to(buf);
    buf[HEADER_SIZE..HEADER_SIZE + payload.len()].copy_from_slice(payload);
    buf[total_len - 1] = checksum(&buf[..total_len - 1]);
    Ok(total_len)
}

/// Serialize one physical frame into a new vector.
pub(super) fn frame_to_vec(header: &Header, payload: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let mut bytes = vec![0u8; HEADER_SIZE + payload.len() + CHECKSUM_SIZE];
    encode_frame(header, payload, &mut bytes)?;
    Ok(bytes)
}

/// Encode a logical message into the datagrams to transmit.
///
/// Payloads up to [`MAX_SINGLE_PAYLOAD`] bytes produce one frame; longer
/// payloads are split into chunk frames by the [`Fragmenter`].
pub fn encode(
    kind: MessageKind,
    timestamp: u32,
    tag: PayloadTag,
    payload: &[u8],
) -> Result<Vec<Vec<u8>>, EncodeError> {
    if payload.len() > MAX_SINGLE_PAYLOAD {
        return Fragmenter::new().split(kind, timestamp, tag, payload);
    }
    let header = Header::new(kind, timestamp, tag);
    Ok(vec![frame_to_vec(&header, payload)?])
}

/// Parse and verify one datagram.
pub fn decode(raw: &[u8]) -> Result<Frame, DecodeError> {
    if raw.len() < MIN_FRAME_SIZE {
        return Err(DecodeError::TooShort { len: raw.len() });
    }
    if raw[0] != MAGIC {
        return Err(DecodeError::BadMagic(raw[0]));
    }
    let (body, trailer) = raw.split_at(raw.len() - CHECKSUM_SIZE);
    let expected = checksum(body);
    if trailer[0] != expected {
        return Err(DecodeError::ChecksumMismatch {
            expected,
            actual: trailer[0],
        });
    }

    let kind = MessageKind::from_bytes(raw[1], raw[2])?;
    let timestamp = u32::from_be_bytes([raw[3], raw[4], raw[5], raw[6]]);
    let tag = PayloadTag::try_from(raw[7])?;
    let payload = &body[HEADER_SIZE..];

    let body = if tag == PayloadTag::Long {
        FrameBody::Chunk(Chunk::from_bytes(payload)?)
    } else {
        FrameBody::Single(payload.to_vec())
    };

    Ok(Frame {
        header: Header::new(kind, timestamp, tag),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{MAX_CHUNK_PAYLOAD, MAX_FRAME_SIZE};
    use crate::message::{Ack, Command, Info};

    const PING: MessageKind = MessageKind::Command(Command::Ping);

    fn single(raw: &[u8]) -> (Header, Vec<u8>) {
        let frame = decode(raw).unwrap();
        match frame.body {
            FrameBody::Single(payload) => (frame.header, payload),
            FrameBody::Chunk(_) => panic!("expected a single frame"),
        }
    }

    #[test]
    fn test_header_layout() {
        let frames = encode(PING, 0x0102_0304, PayloadTag::Str, b"hi").unwrap();
        assert_eq!(frames.len(), 1);
        let raw = &frames[0];
        assert_eq!(raw[..8], [0x2A, 0x01, 0x01, 0x01, 0x02, 0x03, 0x04, 0x05]);
        assert_eq!(&raw[8..10], b"hi");
        let sum: u32 = raw[..10].iter().map(|b| *b as u32).sum();
        assert_eq!(raw[10], (sum % 256) as u8);
    }

    #[test]
    fn test_encode_decode_single() {
        let kind = MessageKind::Info(Info::Message);
        let frames = encode(kind, 99, PayloadTag::Raw, &[1, 2, 3]).unwrap();
        let (header, payload) = single(&frames[0]);
        assert_eq!(header, Header::new(kind, 99, PayloadTag::Raw));
        assert_eq!(payload, vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_payload_is_minimum_frame() {
        let frames = encode(MessageKind::Ack(Ack::Confirm), 0, PayloadTag::None, &[]).unwrap();
        assert_eq!(frames[0].len(), MIN_FRAME_SIZE);
        let (_, payload) = single(&frames[0]);
        assert!(payload.is_empty());
    }

    #[test]
    fn test_threshold_241_is_single_frame() {
        let payload = vec![0xAB; 241];
        let frames = encode(PING, 1, PayloadTag::Raw, &payload).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), MAX_FRAME_SIZE);
    }

    #[test]
    fn test_threshold_242_is_fragmented() {
        let payload = vec![0xAB; 242];
        let frames = encode(PING, 1, PayloadTag::Raw, &payload).unwrap();
        assert!(frames.len() >= 2);
        for raw in &frames {
            assert!(raw.len() <= MAX_FRAME_SIZE);
            assert!(matches!(decode(raw).unwrap().body, FrameBody::Chunk(_)));
        }
    }

    #[test]
    fn test_rejects_short_frames() {
        for len in 0..MIN_FRAME_SIZE {
            let raw = vec![MAGIC; len];
            assert_eq!(decode(&raw), Err(DecodeError::TooShort { len }));
        }
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut raw = encode(PING, 5, PayloadTag::None, &[]).unwrap().remove(0);
        raw[0] = 0x2B;
        assert_eq!(decode(&raw), Err(DecodeError::BadMagic(0x2B)));
    }

    #[test]
    fn test_every_single_bit_flip_rejected() {
        let raw = encode(
            MessageKind::Info(Info::SensorData),
            0xDEAD_BEEF,
            PayloadTag::Str,
            b"temperature=21.5",
        )
        .unwrap()
        .remove(0);
        for byte in 0..raw.len() {
            for bit in 0..8 {
                let mut corrupted = raw.clone();
                corrupted[byte] ^= 1 << bit;
                assert!(
                    decode(&corrupted).is_err(),
                    "bit {} of byte {} accepted",
                    bit,
                    byte
                );
            }
        }
    }

    #[test]
    fn test_rejects_unknown_class_and_tag() {
        let header = Header::new(PING, 0, PayloadTag::None);
        let mut raw = frame_to_vec(&header, &[]).unwrap();
        raw[1] = 0x09;
        raw[8] = checksum(&raw[..8]);
        assert_eq!(decode(&raw), Err(DecodeError::UnknownClass(0x09)));

        let mut raw = frame_to_vec(&header, &[]).unwrap();
        raw[7] = 0x0C;
        raw[8] = checksum(&raw[..8]);
        assert_eq!(decode(&raw), Err(DecodeError::UnknownPayloadTag(0x0C)));
    }

    #[test]
    fn test_rejects_malformed_chunk_headers() {
        let header = Header::new(PING, 0, PayloadTag::Long);
        let cases: [&[u8]; 4] = [
            &[0, 2],                    // truncated
            &[0, 0, PayloadTag::Raw as u8], // zero total
            &[3, 3, PayloadTag::Raw as u8], // index out of range
            &[0, 2, PayloadTag::Long as u8], // nested
        ];
        for payload in cases {
            let raw = frame_to_vec(&header, payload).unwrap();
            assert!(matches!(decode(&raw), Err(DecodeError::InvalidChunk(_))));
        }
    }

    #[test]
    fn test_encode_frame_into_buffer() {
        let header = Header::new(PING, 7, PayloadTag::Raw);
        let mut buf = [0u8; 16];
        let len = encode_frame(&header, &[9, 9], &mut buf).unwrap();
        assert_eq!(len, 11);
        assert_eq!(decode(&buf[..len]).unwrap().body, FrameBody::Single(vec![9, 9]));

        let mut small = [0u8; 4];
        assert_eq!(
            encode_frame(&header, &[9, 9], &mut small),
            Err(EncodeError::BufferTooSmall {
                needed: 11,
                available: 4
            })
        );
    }

    #[test]
    fn test_encode_frame_refuses_oversized_payload() {
        let header = Header::new(PING, 0, PayloadTag::Raw);
        let mut buf = [0u8; 512];
        assert!(matches!(
            encode_frame(&header, &[0; MAX_SINGLE_PAYLOAD + 1], &mut buf),
            Err(EncodeError::PayloadTooLarge { .. })
        ));
        assert!(encode_frame(&header, &[0; MAX_CHUNK_PAYLOAD], &mut buf).is_ok());
    }
}
