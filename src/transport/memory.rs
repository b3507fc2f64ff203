//! In-process simulated radio medium.
//!
//! Every attached transport gets an inbox. A send copies the datagram into
//! the destination's inbox (or every other inbox for broadcast) and records
//! the link's RSSI in the receiver's signal table, the way the ESP-NOW
//! receive callback does on hardware. Unicast sends to a destination that
//! was never registered fail, like `esp_now_send` does.

use super::{Datagram, SignalTable, Transport};
use crate::peer::PeerAddress;
use log::debug;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// RSSI reported for links with no configured value.
pub const DEFAULT_RSSI: i16 = -60;

/// Inbox depth per node; older datagrams are dropped.
pub const INBOX_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct Station {
    inbox: VecDeque<Datagram>,
    signal: SignalTable,
}

#[derive(Debug, Default)]
struct Medium {
    stations: HashMap<PeerAddress, Station>,
    /// RSSI seen by the receiver, keyed by (sender, receiver).
    rssi: HashMap<(PeerAddress, PeerAddress), i16>,
    /// Links that drop every datagram, keyed by (sender, receiver).
    lossy: HashSet<(PeerAddress, PeerAddress)>,
}

impl Medium {
    fn deliver(&mut self, from: PeerAddress, to: PeerAddress, data: &[u8]) -> bool {
        if self.lossy.contains(&(from, to)) {
            debug!("Simulated loss {} -> {}", from, to);
            return false;
        }
        let rssi = self.rssi.get(&(from, to)).copied().unwrap_or(DEFAULT_RSSI);
        let Some(station) = self.stations.get_mut(&to) else {
            return false;
        };
        if station.inbox.len() >= INBOX_CAPACITY {
            station.inbox.pop_front();
        }
        station.inbox.push_back(Datagram {
            source: from,
            data: data.to_vec(),
            rssi: Some(rssi),
        });
        station.signal.insert(from, rssi);
        true
    }
}

/// Shared simulated medium. Clones refer to the same medium.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    medium: Arc<Mutex<Medium>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Medium> {
        self.medium.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Attach a node with the given address.
    pub fn attach(&self, address: PeerAddress) -> MemoryTransport {
        self.lock().stations.entry(address).or_default();
        MemoryTransport {
            address,
            network: self.clone(),
            registered: HashSet::new(),
        }
    }

    /// Set the RSSI both ends of a link observe.
    pub fn set_rssi(&self, a: PeerAddress, b: PeerAddress, rssi: i16) {
        let mut medium = self.lock();
        medium.rssi.insert((a, b), rssi);
        medium.rssi.insert((b, a), rssi);
    }

    /// Drop (or stop dropping) everything sent from `from` to `to`.
    pub fn set_loss(&self, from: PeerAddress, to: PeerAddress, lossy: bool) {
        let mut medium = self.lock();
        if lossy {
            medium.lossy.insert((from, to));
        } else {
            medium.lossy.remove(&(from, to));
        }
    }

    /// Datagrams waiting in a node's inbox.
    pub fn pending(&self, address: &PeerAddress) -> usize {
        self.lock()
            .stations
            .get(address)
            .map_or(0, |station| station.inbox.len())
    }
}

/// One node's handle on a [`MemoryNetwork`].
#[derive(Debug)]
pub struct MemoryTransport {
    address: PeerAddress,
    network: MemoryNetwork,
    registered: HashSet<PeerAddress>,
}

impl Transport for MemoryTransport {
    fn local_address(&self) -> PeerAddress {
        self.address
    }

    fn send(&mut self, dest: &PeerAddress, data: &[u8]) -> bool {
        let mut medium = self.network.lock();
        if dest.is_broadcast() {
            let others: Vec<PeerAddress> = medium
                .stations
                .keys()
                .copied()
                .filter(|addr| *addr != self.address)
                .collect();
            for other in others {
                medium.deliver(self.address, other, data);
            }
            // Broadcast is fire-and-forget.
            return true;
        }
        if !self.registered.contains(dest) {
            debug!("Send to unregistered peer {}", dest);
            return false;
        }
        medium.deliver(self.address, *dest, data)
    }

    fn recv(&mut self) -> Option<Datagram> {
        self.network
            .lock()
            .stations
            .get_mut(&self.address)?
            .inbox
            .pop_front()
    }

    fn signal_strength(&self) -> SignalTable {
        self.network
            .lock()
            .stations
            .get(&self.address)
            .map(|station| station.signal.clone())
            .unwrap_or_default()
    }

    fn register_peer(&mut self, address: &PeerAddress, _channel: u8, _interface: u8) -> bool {
        self.registered.insert(*address);
        true
    }

    fn unregister_peer(&mut self, address: &PeerAddress) {
        self.registered.remove(address);
        if let Some(station) = self.network.lock().stations.get_mut(&self.address) {
            station.signal.remove(address);
        }
    }
}
