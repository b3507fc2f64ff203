//! Payload fragmentation and reassembly.
//!
//! ESP-NOW datagrams are limited to 250 bytes, while structured payloads
//! (proximity tables, config blobs, scripts) can be far larger. Payloads that
//! do not fit one frame are split into chunk frames that all share the same
//! header (class, subtype, sender timestamp) and carry tag `0x07`.
//!
//! # Chunk Format
//!
//! ```text
//! [header: 8 bytes][chunk_index: 1][total_chunks: 1][inner_tag: 1][slice: <=238][checksum: 1]
//! ```
//!
//! # Reassembly
//!
//! Chunks can arrive in any order and may be duplicated. The `Reassembler`
//! keys in-flight messages by sender address, class, subtype, sender
//! timestamp, inner tag and total chunk count, so two peers sending in the
//! same millisecond never share an entry.
//!
//! In-flight entries are bounded by count, by buffered bytes and by age.
//! Eviction is oldest-created first; receiving a chunk does not refresh an
//! entry's age.
//!
//! # Example
//!
//! ```
//! use espnow_link::frame::{decode, FrameBody, Fragmenter, Reassembler};
//! use espnow_link::message::{Info, MessageKind};
//! use espnow_link::payload::PayloadTag;
//! use espnow_link::peer::PeerAddress;
//!
//! let kind = MessageKind::Info(Info::Message);
//! let payload = vec![7u8; 600];
//! let frames = Fragmenter::new().split(kind, 1000, PayloadTag::Raw, &payload).unwrap();
//! assert_eq!(frames.len(), 3);
//!
//! let source = PeerAddress::new([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
//! let mut reassembler = Reassembler::default();
//! let mut complete = None;
//! for raw in frames.iter().rev() {
//!     let frame = decode(raw).unwrap();
//!     if let FrameBody::Chunk(chunk) = frame.body {
//!         complete = reassembler.add_chunk(source, &frame.header, chunk, 1010);
//!     }
//! }
//! assert_eq!(complete.unwrap().payload, payload);
//! ```

use super::codec::{frame_to_vec, Chunk, Header};
use super::{EncodeError, MAX_CHUNKS, MAX_CHUNK_PAYLOAD};
use crate::message::MessageKind;
use crate::payload::PayloadTag;
use crate::peer::PeerAddress;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Default lifetime of an incomplete reassembly, in milliseconds.
const DEFAULT_TIMEOUT_MS: u32 = 10_000;

/// Default maximum number of concurrent incomplete reassemblies.
const DEFAULT_MAX_ENTRIES: usize = 8;

/// Default maximum bytes buffered across all incomplete reassemblies.
const DEFAULT_MAX_BYTES: usize = 75_000;

/// Splits oversized payloads into chunk frames.
#[derive(Debug, Clone, Copy)]
pub struct Fragmenter {
    /// Maximum logical-payload bytes per chunk.
    chunk_size: usize,
}

impl Default for Fragmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Fragmenter {
    /// Create a fragmenter that fills every chunk to the frame limit.
    pub const fn new() -> Self {
        Self {
            chunk_size: MAX_CHUNK_PAYLOAD,
        }
    }

    /// Create a fragmenter with smaller chunks.
    ///
    /// Returns `Err(EncodeError::InvalidChunkSize)` unless
    /// `1 <= chunk_size <= MAX_CHUNK_PAYLOAD`.
    pub fn with_chunk_size(chunk_size: usize) -> Result<Self, EncodeError> {
        if chunk_size == 0 || chunk_size > MAX_CHUNK_PAYLOAD {
            return Err(EncodeError::InvalidChunkSize(chunk_size));
        }
        Ok(Self { chunk_size })
    }

    /// Maximum logical-payload bytes per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of chunks a payload of `len` bytes needs.
    pub fn chunk_count(&self, len: usize) -> usize {
        len.div_ceil(self.chunk_size).max(1)
    }

    /// Split a payload into serialized chunk frames, in index order.
    ///
    /// Rejects payloads needing more than [`MAX_CHUNKS`] chunks.
    pub fn split(
        &self,
        kind: MessageKind,
        timestamp: u32,
        inner_tag: PayloadTag,
        payload: &[u8],
    ) -> Result<Vec<Vec<u8>>, EncodeError> {
        let needed = self.chunk_count(payload.len());
        if needed > MAX_CHUNKS {
            return Err(EncodeError::TooManyChunks {
                needed,
                max: MAX_CHUNKS,
            });
        }

        let header = Header::new(kind, timestamp, PayloadTag::Long);
        let total = needed as u8;
        let mut frames = Vec::with_capacity(needed);
        let mut body = Vec::with_capacity(3 + self.chunk_size);

        let slices: Vec<&[u8]> = if payload.is_empty() {
            vec![payload]
        } else {
            payload.chunks(self.chunk_size).collect()
        };
        for (index, slice) in slices.into_iter().enumerate() {
            body.clear();
            body.push(index as u8);
            body.push(total);
            body.push(inner_tag.as_u8());
            body.extend_from_slice(slice);
            frames.push(frame_to_vec(&header, &body)?);
        }

        Ok(frames)
    }
}

/// Limits for in-flight reassemblies.
///
/// Note: This is `Copy` for efficient passing to constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReassemblyConfig {
    /// Milliseconds an incomplete message is kept after its first chunk.
    pub timeout_ms: u32,
    /// Maximum concurrent incomplete messages.
    pub max_entries: usize,
    /// Maximum bytes buffered across all incomplete messages.
    pub max_bytes: usize,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_entries: DEFAULT_MAX_ENTRIES,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl ReassemblyConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.timeout_ms == 0 {
            return Err("reassembly timeout_ms must be greater than 0");
        }
        if self.max_entries == 0 {
            return Err("reassembly max_entries must be greater than 0");
        }
        if self.max_bytes < MAX_CHUNKS * MAX_CHUNK_PAYLOAD {
            return Err("reassembly max_bytes must hold the largest fragmented message");
        }
        Ok(())
    }
}

/// A logical message rebuilt from all of its chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reassembled {
    pub kind: MessageKind,
    pub timestamp: u32,
    /// Tag of the logical payload.
    pub tag: PayloadTag,
    pub payload: Vec<u8>,
}

/// Identifies one in-flight logical message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ReassemblyKey {
    source: PeerAddress,
    kind: MessageKind,
    timestamp: u32,
    inner_tag: PayloadTag,
    total: u8,
}

/// State for a message being reassembled.
#[derive(Debug)]
struct PendingMessage {
    /// One slot per chunk index.
    slots: Vec<Option<Vec<u8>>>,
    /// Number of filled slots.
    filled: usize,
    /// Bytes held in the slots.
    bytes: usize,
    /// Local clock when the first chunk arrived.
    started_ms: u32,
}

impl PendingMessage {
    fn new(total: u8, started_ms: u32) -> Self {
        Self {
            slots: vec![None; total as usize],
            filled: 0,
            bytes: 0,
            started_ms,
        }
    }

    fn is_complete(&self) -> bool {
        self.filled == self.slots.len()
    }

    /// Concatenate the slots in index order.
    fn assemble(self) -> Vec<u8> {
        let mut result = Vec::with_capacity(self.bytes);
        for slot in self.slots.into_iter().flatten() {
            result.extend_from_slice(&slot);
        }
        result
    }
}

/// Reassembles chunks back into logical messages.
///
/// # Memory Safety
///
/// The reassembler has configurable limits to prevent memory exhaustion:
/// - `max_entries`: Maximum concurrent reassemblies (default: 8)
/// - `max_bytes`: Maximum buffered bytes across reassemblies (default: 75 000)
/// - `timeout_ms`: Age after which an incomplete message is dropped (default: 10 s)
///
/// When a limit is exceeded, the oldest entries are evicted. The entry that
/// just received a chunk is never evicted.
#[derive(Debug)]
pub struct Reassembler {
    pending: HashMap<ReassemblyKey, PendingMessage>,
    /// Keys in creation order, oldest first.
    order: VecDeque<ReassemblyKey>,
    buffered_bytes: usize,
    config: ReassemblyConfig,
    evicted: u64,
    expired: u64,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(ReassemblyConfig::default())
    }
}

impl Reassembler {
    /// Create a new reassembler with the given limits.
    pub fn new(config: ReassemblyConfig) -> Self {
        Self {
            pending: HashMap::new(),
            order: VecDeque::new(),
            buffered_bytes: 0,
            config,
            evicted: 0,
            expired: 0,
        }
    }

    /// Add a chunk and return the logical message if it is now complete.
    ///
    /// # Arguments
    ///
    /// * `source` - Link address of the sender
    /// * `header` - Header of the chunk frame
    /// * `chunk` - The decoded chunk
    /// * `now_ms` - Local millisecond clock
    ///
    /// Duplicate chunk indices are ignored. Returns `None` while chunks are
    /// still missing, or if the chunk was rejected or its entry evicted.
    pub fn add_chunk(
        &mut self,
        source: PeerAddress,
        header: &Header,
        chunk: Chunk,
        now_ms: u32,
    ) -> Option<Reassembled> {
        self.expire(now_ms);

        if chunk.total == 0 || chunk.index >= chunk.total {
            debug!("Dropping chunk {}/{} from {}", chunk.index, chunk.total, source);
            return None;
        }

        let key = ReassemblyKey {
            source,
            kind: header.kind,
            timestamp: header.timestamp,
            inner_tag: chunk.inner_tag,
            total: chunk.total,
        };

        let pending = self.pending.entry(key).or_insert_with(|| {
            debug!(
                "Starting reassembly of {} chunks ({}) from {}",
                chunk.total, header.kind, source
            );
            self.order.push_back(key);
            PendingMessage::new(chunk.total, now_ms)
        });

        let slot = &mut pending.slots[chunk.index as usize];
        if slot.is_some() {
            debug!("Duplicate chunk {} from {} ignored", chunk.index, source);
            return None;
        }

        let len = chunk.data.len();
        *slot = Some(chunk.data);
        pending.filled += 1;
        pending.bytes += len;
        self.buffered_bytes += len;

        if pending.is_complete() {
            let pending = self.remove(&key)?;
            return Some(Reassembled {
                kind: key.kind,
                timestamp: key.timestamp,
                tag: key.inner_tag,
                payload: pending.assemble(),
            });
        }

        self.enforce_limits(&key);
        None
    }

    /// Drop incomplete messages older than the timeout.
    ///
    /// Returns the number of entries removed. Call this periodically from the
    /// main loop; it also runs on every chunk.
    pub fn expire(&mut self, now_ms: u32) -> usize {
        let timeout = self.config.timeout_ms;
        let stale: Vec<ReassemblyKey> = self
            .order
            .iter()
            .filter(|key| {
                self.pending
                    .get(key)
                    .is_some_and(|p| now_ms.wrapping_sub(p.started_ms) >= timeout)
            })
            .copied()
            .collect();

        for key in &stale {
            if let Some(pending) = self.remove(key) {
                debug!(
                    "Reassembly from {} timed out with {}/{} chunks",
                    key.source,
                    pending.filled,
                    pending.slots.len()
                );
            }
        }
        self.expired += stale.len() as u64;
        stale.len()
    }

    /// Evict oldest entries other than `current` until both limits hold.
    fn enforce_limits(&mut self, current: &ReassemblyKey) {
        while self.pending.len() > self.config.max_entries
            || self.buffered_bytes > self.config.max_bytes
        {
            let Some(oldest) = self.order.iter().find(|k| *k != current).copied() else {
                break;
            };
            if let Some(pending) = self.remove(&oldest) {
                warn!(
                    "Evicted reassembly from {} ({} bytes buffered)",
                    oldest.source, pending.bytes
                );
                self.evicted += 1;
            }
        }
    }

    fn remove(&mut self, key: &ReassemblyKey) -> Option<PendingMessage> {
        let pending = self.pending.remove(key)?;
        self.order.retain(|k| k != key);
        self.buffered_bytes -= pending.bytes;
        Some(pending)
    }

    /// Get the number of incomplete reassemblies.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Get the bytes buffered across incomplete reassemblies.
    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    /// Number of entries evicted by the count or byte limits.
    pub fn evicted_count(&self) -> u64 {
        self.evicted
    }

    /// Number of entries dropped by the timeout.
    pub fn expired_count(&self) -> u64 {
        self.expired
    }

    /// Get the reassembly limits.
    pub fn config(&self) -> &ReassemblyConfig {
        &self.config
    }

    /// Clear all pending reassemblies.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.order.clear();
        self.buffered_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{decode, FrameBody, MAX_FRAME_SIZE};
    use crate::message::{Command, Info};

    const KIND: MessageKind = MessageKind::Info(Info::Message);

    /// Default source address for tests.
    const TEST_SOURCE: PeerAddress = PeerAddress::new([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);

    /// Second source address for multi-peer tests.
    const TEST_SOURCE_2: PeerAddress = PeerAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

    fn chunks(frames: &[Vec<u8>]) -> Vec<(Header, Chunk)> {
        frames
            .iter()
            .map(|raw| {
                let frame = decode(raw).unwrap();
                match frame.body {
                    FrameBody::Chunk(chunk) => (frame.header, chunk),
                    FrameBody::Single(_) => panic!("expected a chunk"),
                }
            })
            .collect()
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..=255u8).cycle().take(len).collect()
    }

    /// Start an incomplete two-chunk reassembly for the given timestamp.
    fn start(reassembler: &mut Reassembler, source: PeerAddress, timestamp: u32, now: u32) {
        let header = Header::new(KIND, timestamp, PayloadTag::Long);
        let chunk = Chunk {
            index: 0,
            total: 2,
            inner_tag: PayloadTag::Raw,
            data: vec![timestamp as u8; 10],
        };
        assert_eq!(reassembler.add_chunk(source, &header, chunk, now), None);
    }

    // ==================== Fragmenter Tests ====================

    #[test]
    fn test_split_layout() {
        let payload = pattern(500);
        let frames = Fragmenter::new().split(KIND, 42, PayloadTag::Raw, &payload).unwrap();
        assert_eq!(frames.len(), 3);

        let parsed = chunks(&frames);
        for (i, (header, chunk)) in parsed.iter().enumerate() {
            assert_eq!(header.kind, KIND);
            assert_eq!(header.timestamp, 42);
            assert_eq!(header.tag, PayloadTag::Long);
            assert_eq!(chunk.index as usize, i);
            assert_eq!(chunk.total, 3);
            assert_eq!(chunk.inner_tag, PayloadTag::Raw);
        }
        assert_eq!(parsed[0].1.data.len(), MAX_CHUNK_PAYLOAD);
        assert_eq!(parsed[1].1.data.len(), MAX_CHUNK_PAYLOAD);
        assert_eq!(parsed[2].1.data.len(), 500 - 2 * MAX_CHUNK_PAYLOAD);
        assert!(frames.iter().all(|f| f.len() <= MAX_FRAME_SIZE));
    }

    #[test]
    fn test_split_limit() {
        let fragmenter = Fragmenter::new();
        let largest = vec![0u8; MAX_CHUNKS * MAX_CHUNK_PAYLOAD];
        assert_eq!(
            fragmenter.split(KIND, 0, PayloadTag::Raw, &largest).unwrap().len(),
            MAX_CHUNKS
        );

        let too_large = vec![0u8; MAX_CHUNKS * MAX_CHUNK_PAYLOAD + 1];
        assert_eq!(
            fragmenter.split(KIND, 0, PayloadTag::Raw, &too_large),
            Err(EncodeError::TooManyChunks {
                needed: MAX_CHUNKS + 1,
                max: MAX_CHUNKS
            })
        );
    }

    #[test]
    fn test_custom_chunk_size() {
        assert!(Fragmenter::with_chunk_size(0).is_err());
        assert!(Fragmenter::with_chunk_size(MAX_CHUNK_PAYLOAD + 1).is_err());

        let fragmenter = Fragmenter::with_chunk_size(10).unwrap();
        assert_eq!(fragmenter.chunk_count(25), 3);
        let frames = fragmenter.split(KIND, 0, PayloadTag::Str, b"abcdefghijklmnopqrstuvwxy").unwrap();
        assert_eq!(frames.len(), 3);
    }

    // ==================== Reassembler Tests ====================

    #[test]
    fn test_forward_and_reverse_order_agree() {
        let payload = pattern(1000);
        let frames = Fragmenter::new().split(KIND, 7, PayloadTag::Raw, &payload).unwrap();
        let parsed = chunks(&frames);

        let mut forward = Reassembler::default();
        let mut result_forward = None;
        for (header, chunk) in parsed.clone() {
            result_forward = forward.add_chunk(TEST_SOURCE, &header, chunk, 0);
        }

        let mut reverse = Reassembler::default();
        let mut result_reverse = None;
        for (header, chunk) in parsed.into_iter().rev() {
            result_reverse = reverse.add_chunk(TEST_SOURCE, &header, chunk, 0);
        }

        let forward = result_forward.unwrap();
        assert_eq!(forward.payload, payload);
        assert_eq!(forward.tag, PayloadTag::Raw);
        assert_eq!(forward.timestamp, 7);
        assert_eq!(Some(forward), result_reverse);
    }

    #[test]
    fn test_duplicate_chunk_is_ignored() {
        let payload = pattern(600);
        let frames = Fragmenter::new().split(KIND, 1, PayloadTag::Raw, &payload).unwrap();
        let parsed = chunks(&frames);
        let mut reassembler = Reassembler::default();

        let (h0, c0) = parsed[0].clone();
        let (h1, c1) = parsed[1].clone();
        let (h2, c2) = parsed[2].clone();

        assert_eq!(reassembler.add_chunk(TEST_SOURCE, &h0, c0.clone(), 0), None);
        assert_eq!(reassembler.add_chunk(TEST_SOURCE, &h0, c0.clone(), 0), None);
        assert_eq!(reassembler.add_chunk(TEST_SOURCE, &h1, c1, 0), None);
        assert_eq!(reassembler.add_chunk(TEST_SOURCE, &h0, c0, 0), None);
        assert_eq!(reassembler.buffered_bytes(), 2 * MAX_CHUNK_PAYLOAD);

        let result = reassembler.add_chunk(TEST_SOURCE, &h2, c2, 0).unwrap();
        assert_eq!(result.payload, payload);
        assert_eq!(reassembler.pending_count(), 0);
        assert_eq!(reassembler.buffered_bytes(), 0);
    }

    #[test]
    fn test_max_entries_evicts_oldest() {
        let config = ReassemblyConfig {
            max_entries: 2,
            ..Default::default()
        };
        let mut reassembler = Reassembler::new(config);

        start(&mut reassembler, TEST_SOURCE, 1, 0);
        start(&mut reassembler, TEST_SOURCE, 2, 0);
        start(&mut reassembler, TEST_SOURCE, 3, 0);
        assert_eq!(reassembler.pending_count(), 2);
        assert_eq!(reassembler.evicted_count(), 1);

        // Completing the newest works, the oldest is gone.
        let finish = |ts: u32| {
            (
                Header::new(KIND, ts, PayloadTag::Long),
                Chunk {
                    index: 1,
                    total: 2,
                    inner_tag: PayloadTag::Raw,
                    data: vec![0xEE],
                },
            )
        };
        let (h, c) = finish(3);
        assert!(reassembler.add_chunk(TEST_SOURCE, &h, c, 0).is_some());
        let (h, c) = finish(1);
        assert_eq!(reassembler.add_chunk(TEST_SOURCE, &h, c, 0), None);
    }

    #[test]
    fn test_eviction_ignores_access_order() {
        let config = ReassemblyConfig {
            max_entries: 2,
            ..Default::default()
        };
        let mut reassembler = Reassembler::new(config);
        start(&mut reassembler, TEST_SOURCE, 1, 0);
        start(&mut reassembler, TEST_SOURCE, 2, 0);

        // Touch entry 1 again with a duplicate; it stays the oldest.
        start_duplicate(&mut reassembler, 1);
        start(&mut reassembler, TEST_SOURCE, 3, 0);

        let header = Header::new(KIND, 2, PayloadTag::Long);
        let last = Chunk {
            index: 1,
            total: 2,
            inner_tag: PayloadTag::Raw,
            data: vec![],
        };
        assert!(reassembler.add_chunk(TEST_SOURCE, &header, last, 0).is_some());
    }

    fn start_duplicate(reassembler: &mut Reassembler, timestamp: u32) {
        let header = Header::new(KIND, timestamp, PayloadTag::Long);
        let chunk = Chunk {
            index: 0,
            total: 2,
            inner_tag: PayloadTag::Raw,
            data: vec![timestamp as u8; 10],
        };
        assert_eq!(reassembler.add_chunk(TEST_SOURCE, &header, chunk, 0), None);
    }

    #[test]
    fn test_max_bytes_evicts_oldest() {
        let config = ReassemblyConfig {
            max_bytes: 1000,
            ..Default::default()
        };
        let mut reassembler = Reassembler::new(config);
        let payload = pattern(3 * MAX_CHUNK_PAYLOAD);

        for ts in 0..4u32 {
            let frames = Fragmenter::new().split(KIND, ts, PayloadTag::Raw, &payload).unwrap();
            let parsed = chunks(&frames);
            for (header, chunk) in parsed.into_iter().take(2) {
                reassembler.add_chunk(TEST_SOURCE, &header, chunk, 0);
            }
            assert!(reassembler.buffered_bytes() <= 1000);
        }
        assert_eq!(reassembler.pending_count(), 2);
    }

    #[test]
    fn test_timeout_drops_entry() {
        let mut reassembler = Reassembler::default();
        start(&mut reassembler, TEST_SOURCE, 1, 1_000);

        assert_eq!(reassembler.expire(10_999), 0);
        assert_eq!(reassembler.pending_count(), 1);

        assert_eq!(reassembler.expire(11_000), 1);
        assert_eq!(reassembler.pending_count(), 0);
        assert_eq!(reassembler.buffered_bytes(), 0);
        assert_eq!(reassembler.expired_count(), 1);
    }

    #[test]
    fn test_timeout_survives_clock_wrap() {
        let mut reassembler = Reassembler::default();
        start(&mut reassembler, TEST_SOURCE, 1, u32::MAX - 100);
        assert_eq!(reassembler.expire(500), 0);
        assert_eq!(reassembler.expire(DEFAULT_TIMEOUT_MS), 1);
    }

    #[test]
    fn test_sources_do_not_collide() {
        // Same class, subtype and timestamp from two peers.
        let header = Header::new(MessageKind::Command(Command::SetConfig), 5, PayloadTag::Long);
        let chunk = |index: u8, byte: u8| Chunk {
            index,
            total: 2,
            inner_tag: PayloadTag::Raw,
            data: vec![byte; 3],
        };
        let mut reassembler = Reassembler::default();

        assert_eq!(reassembler.add_chunk(TEST_SOURCE, &header, chunk(0, 1), 0), None);
        assert_eq!(reassembler.add_chunk(TEST_SOURCE_2, &header, chunk(0, 9), 0), None);
        assert_eq!(reassembler.pending_count(), 2);

        let second = reassembler.add_chunk(TEST_SOURCE_2, &header, chunk(1, 9), 0).unwrap();
        assert_eq!(second.payload, vec![9; 6]);
        let first = reassembler.add_chunk(TEST_SOURCE, &header, chunk(1, 1), 0).unwrap();
        assert_eq!(first.payload, vec![1; 6]);
    }

    #[test]
    fn test_single_chunk_message_completes() {
        let header = Header::new(KIND, 0, PayloadTag::Long);
        let chunk = Chunk {
            index: 0,
            total: 1,
            inner_tag: PayloadTag::Str,
            data: b"solo".to_vec(),
        };
        let result = Reassembler::default()
            .add_chunk(TEST_SOURCE, &header, chunk, 0)
            .unwrap();
        assert_eq!(result.tag, PayloadTag::Str);
        assert_eq!(result.payload, b"solo");
    }

    #[test]
    fn test_clear() {
        let mut reassembler = Reassembler::default();
        start(&mut reassembler, TEST_SOURCE, 1, 0);
        reassembler.clear();
        assert_eq!(reassembler.pending_count(), 0);
        assert_eq!(reassembler.buffered_bytes(), 0);
    }

    #[test]
    fn test_config_validation() {
        assert!(ReassemblyConfig::default().validate().is_ok());
        let zero_timeout = ReassemblyConfig {
            timeout_ms: 0,
            ..Default::default()
        };
        assert!(zero_timeout.validate().is_err());
        let zero_entries = ReassemblyConfig {
            max_entries: 0,
            ..Default::default()
        };
        assert!(zero_entries.validate().is_err());
        let one_chunk = ReassemblyConfig {
            max_bytes: MAX_CHUNK_PAYLOAD,
            ..Default::default()
        };
        assert!(one_chunk.validate().is_err());
        let largest = ReassemblyConfig {
            max_bytes: MAX_CHUNKS * MAX_CHUNK_PAYLOAD,
            ..Default::default()
        };
        assert!(largest.validate().is_ok());
    }

    #[test]
    fn test_message_larger_than_byte_limit_still_completes() {
        let config = ReassemblyConfig {
            max_bytes: 300,
            ..Default::default()
        };
        let mut reassembler = Reassembler::new(config);
        start(&mut reassembler, TEST_SOURCE, 1, 0);

        let payload = pattern(3 * MAX_CHUNK_PAYLOAD);
        let frames = Fragmenter::new().split(KIND, 2, PayloadTag::Raw, &payload).unwrap();
        let mut complete = None;
        for (header, chunk) in chunks(&frames) {
            complete = reassembler.add_chunk(TEST_SOURCE, &header, chunk, 0);
        }
        assert_eq!(complete.unwrap().payload, payload);
        // The older entry made room for it.
        assert_eq!(reassembler.pending_count(), 0);
        assert_eq!(reassembler.evicted_count(), 1);
    }
}
