//! ESP-NOW node-to-node message protocol.
//!
//! Framing, fragmentation, peer tracking, command dispatch with
//! authorization and a bounded inbound queue for devices sharing a
//! connectionless, unordered, MTU-limited datagram link.
//!
//! Everything except the ESP-NOW transport and the ESP32 platform is
//! platform-independent and tested on the host.

pub mod auth;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod frame;
pub mod message;
pub mod node;
pub mod payload;
pub mod peer;
pub mod platform;
pub mod queue;
pub mod transport;

// Re-export commonly used items
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, Identity, NodeConfig};
pub use frame::{DecodeError, EncodeError};
pub use message::{Ack, Command, Info, Message, MessageKind, Outgoing};
pub use node::{Node, NodeError, NodeStats};
pub use payload::{NumberEncoding, Payload, PayloadTag};
pub use peer::{Peer, PeerAddress, PeerMetadata, PeerRegistry};
pub use platform::{NoopPlatform, Platform, PlatformError, WifiCredentials};
pub use queue::{InboundQueue, QueuedMessage};
pub use transport::{Datagram, MemoryNetwork, MemoryTransport, SignalTable, Transport};

#[cfg(feature = "esp32")]
pub use platform::EspPlatform;
#[cfg(feature = "esp32")]
pub use transport::EspNowTransport;
