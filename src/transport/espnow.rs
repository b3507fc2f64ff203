//! ESP-NOW transport.
//!
//! Wraps `esp_idf_svc::espnow::EspNow`. The receive callback runs in the Wi-Fi
//! task, so it only copies the datagram into a bounded queue and records the
//! sender's RSSI; all protocol work happens later in `Node::poll`.
//!
//! Wi-Fi must be started (station or soft-AP mode) before
//! [`EspNowTransport::new`] is called.

use super::{Datagram, SignalTable, Transport};
use crate::peer::PeerAddress;
use esp_idf_svc::espnow::{EspNow, PeerInfo, BROADCAST};
use esp_idf_sys::EspError;
use log::{debug, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Receive queue depth; older datagrams are dropped.
pub const RX_QUEUE_CAPACITY: usize = 32;

#[derive(Debug, Default)]
struct Shared {
    rx: VecDeque<Datagram>,
    signal: SignalTable,
    overruns: u64,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

/// ESP-NOW datagram link.
pub struct EspNowTransport {
    espnow: EspNow<'static>,
    address: PeerAddress,
    shared: Arc<Mutex<Shared>>,
}

impl EspNowTransport {
    /// Take the ESP-NOW driver and install the receive callback.
    ///
    /// `address` is this node's station MAC.
    pub fn new(address: PeerAddress) -> Result<Self, EspError> {
        let espnow = EspNow::take()?;
        let shared = Arc::new(Mutex::new(Shared::default()));

        let rx = shared.clone();
        espnow.register_recv_cb(move |info, data| {
            let source = PeerAddress::new(*info.src_addr);
            let rssi = info.rx_ctrl.rssi() as i16;
            let mut shared = lock(&rx);
            if shared.rx.len() >= RX_QUEUE_CAPACITY {
                shared.rx.pop_front();
                shared.overruns += 1;
            }
            shared.rx.push_back(Datagram {
                source,
                data: data.to_vec(),
                rssi: Some(rssi),
            });
            shared.signal.insert(source, rssi);
        })?;

        let mut transport = Self {
            espnow,
            address,
            shared,
        };
        // Broadcast frames need the broadcast peer registered.
        transport.register_peer(&PeerAddress::new(BROADCAST), 0, 0);
        Ok(transport)
    }

    /// Datagrams dropped because the receive queue was full.
    pub fn overruns(&self) -> u64 {
        lock(&self.shared).overruns
    }
}

impl Transport for EspNowTransport {
    fn local_address(&self) -> PeerAddress {
        self.address
    }

    fn send(&mut self, dest: &PeerAddress, data: &[u8]) -> bool {
        match self.espnow.send(*dest.as_bytes(), data) {
            Ok(()) => true,
            Err(e) => {
                debug!("ESP-NOW send to {} failed: {:?}", dest, e);
                false
            }
        }
    }

    fn recv(&mut self) -> Option<Datagram> {
        lock(&self.shared).rx.pop_front()
    }

    fn signal_strength(&self) -> SignalTable {
        lock(&self.shared).signal.clone()
    }

    fn register_peer(&mut self, address: &PeerAddress, channel: u8, interface: u8) -> bool {
        if self.espnow.peer_exists(*address.as_bytes()).unwrap_or(false) {
            return true;
        }
        let info = PeerInfo {
            peer_addr: *address.as_bytes(),
            channel,
            ifidx: interface as _,
            encrypt: false,
            ..Default::default()
        };
        match self.espnow.add_peer(info) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to register ESP-NOW peer {}: {:?}", address, e);
                false
            }
        }
    }

    fn unregister_peer(&mut self, address: &PeerAddress) {
        lock(&self.shared).signal.remove(address);
        if let Err(e) = self.espnow.del_peer(*address.as_bytes()) {
            debug!("Failed to remove ESP-NOW peer {}: {:?}", address, e);
        }
    }
}
