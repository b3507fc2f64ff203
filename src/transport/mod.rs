//! Transport abstraction layer.
//!
//! The protocol core never touches the radio directly. It talks to a
//! [`Transport`], which works on:
//! - **ESP32** (`esp32` feature): ESP-NOW via `esp-idf-svc`
//! - **Host**: an in-process simulated medium ([`MemoryNetwork`]) used by
//!   tests and the `host-node` binary
//!
//! The link is connectionless, unordered and unacknowledged. A send is one
//! attempt; retries are the node's business. Unicast destinations must be
//! registered with [`Transport::register_peer`] first, as ESP-NOW requires.
//!
//! # Example
//!
//! ```
//! use espnow_link::peer::PeerAddress;
//! use espnow_link::transport::{MemoryNetwork, Transport};
//!
//! let network = MemoryNetwork::new();
//! let a = PeerAddress::new([0, 0, 0, 0, 0, 1]);
//! let b = PeerAddress::new([0, 0, 0, 0, 0, 2]);
//! let mut ta = network.attach(a);
//! let mut tb = network.attach(b);
//! network.set_rssi(a, b, -42);
//!
//! assert!(!ta.send(&b, b"hello"));
//! assert!(ta.register_peer(&b, 0, 0));
//! assert!(ta.send(&b, b"hello"));
//! let datagram = tb.recv().unwrap();
//! assert_eq!(datagram.source, a);
//! assert_eq!(datagram.rssi, Some(-42));
//! ```

use crate::peer::PeerAddress;
use std::collections::BTreeMap;

mod memory;

#[cfg(feature = "esp32")]
mod espnow;

pub use memory::{MemoryNetwork, MemoryTransport};

#[cfg(feature = "esp32")]
pub use espnow::EspNowTransport;

/// Live signal strength per address, in dBm, maintained by the transport.
pub type SignalTable = BTreeMap<PeerAddress, i16>;

/// One received datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub source: PeerAddress,
    pub data: Vec<u8>,
    /// Signal strength of this datagram, if the radio reports it.
    pub rssi: Option<i16>,
}

/// Datagram link used by a node.
pub trait Transport {
    /// This node's own link address.
    fn local_address(&self) -> PeerAddress;

    /// Make one attempt to send a datagram. Returns `false` if not delivered.
    fn send(&mut self, dest: &PeerAddress, data: &[u8]) -> bool;

    /// Take the next received datagram, if any. Never blocks.
    fn recv(&mut self) -> Option<Datagram>;

    /// Current signal-strength table.
    fn signal_strength(&self) -> SignalTable;

    /// Register a unicast destination with the radio. Registering a known
    /// destination again succeeds.
    fn register_peer(&mut self, _address: &PeerAddress, _channel: u8, _interface: u8) -> bool {
        true
    }

    /// Forget a unicast destination and its signal-strength entry.
    fn unregister_peer(&mut self, _address: &PeerAddress) {}
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn local_address(&self) -> PeerAddress {
        (**self).local_address()
    }

    fn send(&mut self, dest: &PeerAddress, data: &[u8]) -> bool {
        (**self).send(dest, data)
    }

    fn recv(&mut self) -> Option<Datagram> {
        (**self).recv()
    }

    fn signal_strength(&self) -> SignalTable {
        (**self).signal_strength()
    }

    fn register_peer(&mut self, address: &PeerAddress, channel: u8, interface: u8) -> bool {
        (**self).register_peer(address, channel, interface)
    }

    fn unregister_peer(&mut self, address: &PeerAddress) {
        (**self).unregister_peer(address)
    }
}
