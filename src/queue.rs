//! Inbound application message queue.
//!
//! Informational "message" frames are appended here for the application to
//! drain with `check_messages` / `return_message`. The queue is bounded by
//! message count and by total payload bytes; when either bound would be
//! exceeded the oldest messages are dropped first.

use crate::payload::{NumberEncoding, Payload};
use crate::peer::PeerAddress;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default maximum number of queued messages.
pub const DEFAULT_MAX_MESSAGES: usize = 2048;

/// Default maximum payload bytes across all queued messages.
pub const DEFAULT_MAX_BYTES: usize = 20_000;

/// Queue bounds.
///
/// Note: This is `Copy` for efficient passing to constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_messages: usize,
    pub max_bytes: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_MAX_MESSAGES,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl QueueConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.max_messages == 0 {
            return Err("queue max_messages must be greater than 0");
        }
        if self.max_bytes == 0 {
            return Err("queue max_bytes must be greater than 0");
        }
        Ok(())
    }
}

/// A message waiting for the application.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
    /// Link address of the sender.
    pub source: PeerAddress,
    pub payload: Payload,
    /// Local clock when the message was received.
    pub received_at: u32,
    /// Bytes charged against the queue's byte budget.
    size: usize,
}

impl QueuedMessage {
    pub fn new(source: PeerAddress, payload: Payload, received_at: u32) -> Self {
        let size = payload.encoded_len(NumberEncoding::Binary);
        Self {
            source,
            payload,
            received_at,
            size,
        }
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }
}

/// Bounded FIFO of received application messages.
#[derive(Debug, Default)]
pub struct InboundQueue {
    messages: VecDeque<QueuedMessage>,
    bytes: usize,
    config: QueueConfig,
    dropped: u64,
}

impl InboundQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            messages: VecDeque::new(),
            bytes: 0,
            config,
            dropped: 0,
        }
    }

    /// Append a message, dropping the oldest while over either bound.
    ///
    /// A single message larger than the byte bound is still kept, alone.
    pub fn push(&mut self, message: QueuedMessage) {
        self.bytes += message.size;
        self.messages.push_back(message);

        while self.messages.len() > 1
            && (self.messages.len() > self.config.max_messages || self.bytes > self.config.max_bytes)
        {
            if let Some(oldest) = self.pop() {
                warn!(
                    "Inbound queue full, dropped message from {} ({} bytes)",
                    oldest.source, oldest.size
                );
                self.dropped += 1;
            }
        }
    }

    /// Remove and return the oldest message.
    pub fn pop(&mut self) -> Option<QueuedMessage> {
        let message = self.messages.pop_front()?;
        self.bytes -= message.size;
        Some(message)
    }

    /// Remove and return every queued message, oldest first.
    pub fn drain(&mut self) -> Vec<QueuedMessage> {
        self.bytes = 0;
        self.messages.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Payload bytes currently queued.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Messages dropped to make room.
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }
}
