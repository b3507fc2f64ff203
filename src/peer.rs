//! Peer registry.
//!
//! Every node keeps a table of the peers it has heard from, keyed by 6-byte
//! link address. Entries are created on first contact (a ping, any frame, or
//! an explicit registration), updated on every frame from that address and
//! never removed implicitly.
//!
//! Live signal strength is owned by the transport. The registry only keeps
//! the last value it observed; [`PeerRegistry::snapshot`] overlays registry
//! metadata on the transport's current table.
//!
//! # Example
//!
//! ```
//! use espnow_link::peer::{PeerAddress, PeerRegistry};
//! use espnow_link::transport::SignalTable;
//!
//! let hub: PeerAddress = "24:6F:28:AA:BB:CC".parse().unwrap();
//! let mut registry = PeerRegistry::new();
//!
//! // Unknown addresses never fail a lookup; they become bare entries.
//! assert_eq!(registry.lookup_name(&hub), None);
//! assert_eq!(registry.len(), 1);
//!
//! let mut signal = SignalTable::new();
//! signal.insert(hub, -48);
//! assert_eq!(registry.peers_above(-70, &signal), vec![hub]);
//! ```

use crate::payload::Payload;
use crate::transport::SignalTable;
use log::info;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// 6-byte link-layer (MAC) address of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerAddress([u8; 6]);

impl PeerAddress {
    /// The all-ones broadcast address.
    pub const BROADCAST: Self = Self([0xFF; 6]);

    /// Create an address from raw bytes.
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes of the address.
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl From<[u8; 6]> for PeerAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Error parsing a textual address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressParseError(String);

impl fmt::Display for AddressParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid peer address: {}", self.0)
    }
}

impl std::error::Error for AddressParseError {}

impl FromStr for PeerAddress {
    type Err = AddressParseError;

    /// Accepts `AA:BB:CC:DD:EE:FF`, `AA-BB-CC-DD-EE-FF` or 12 bare hex digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s
            .trim()
            .chars()
            .filter(|c| *c != ':' && *c != '-')
            .collect();
        if digits.len() != 12 || !digits.is_ascii() {
            return Err(AddressParseError(s.to_string()));
        }
        let mut bytes = [0u8; 6];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&digits[2 * i..2 * i + 2], 16)
                .map_err(|_| AddressParseError(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for PeerAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PeerAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Self-description a node sends in a ping and returns in a pong.
///
/// Every field is optional; absent fields leave the receiver's record as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Opaque configuration blob.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<u8>,
}

/// Everything this node knows about one remote node.
#[derive(Debug, Clone, PartialEq)]
pub struct Peer {
    pub address: PeerAddress,
    pub name: Option<String>,
    pub id: Option<String>,
    pub config: Option<Value>,
    pub version: Option<String>,
    /// Radio channel (0 means "current channel").
    pub channel: u8,
    /// Radio interface index.
    pub interface: u8,
    /// Last signal strength observed, in dBm.
    pub rssi: Option<i16>,
    /// Local clock when the last frame arrived.
    pub last_seen: Option<u32>,
    /// Local clock when the last pong arrived.
    pub last_ping: Option<u32>,
    /// Round-trip time measured by the last pong.
    pub rtt_ms: Option<u32>,
    /// Newest sensor-data value.
    pub sensor_data: Option<Payload>,
    /// Sensor-data value before the newest.
    pub previous_sensor_data: Option<Payload>,
    /// Proximity table the peer last broadcast.
    pub proximity: Option<Value>,
}

impl Peer {
    fn new(address: PeerAddress) -> Self {
        Self {
            address,
            name: None,
            id: None,
            config: None,
            version: None,
            channel: 0,
            interface: 0,
            rssi: None,
            last_seen: None,
            last_ping: None,
            rtt_ms: None,
            sensor_data: None,
            previous_sensor_data: None,
            proximity: None,
        }
    }

    /// Merge the fields present in `metadata`.
    fn apply(&mut self, metadata: &PeerMetadata) {
        if let Some(name) = &metadata.name {
            self.name = Some(name.clone());
        }
        if let Some(id) = &metadata.id {
            self.id = Some(id.clone());
        }
        if let Some(config) = &metadata.config {
            self.config = Some(config.clone());
        }
        if let Some(version) = &metadata.version {
            self.version = Some(version.clone());
        }
        if let Some(channel) = metadata.channel {
            self.channel = channel;
        }
        if let Some(interface) = metadata.interface {
            self.interface = interface;
        }
    }

    /// The metadata as a peer would advertise it.
    pub fn metadata(&self) -> PeerMetadata {
        PeerMetadata {
            name: self.name.clone(),
            id: self.id.clone(),
            config: self.config.clone(),
            version: self.version.clone(),
            channel: Some(self.channel),
            interface: Some(self.interface),
        }
    }
}

/// One row of the proximity table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub last_seen: Option<u32>,
    pub channel: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtt_ms: Option<u32>,
}

/// Table of known peers.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: HashMap<PeerAddress, Peer>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or update a peer, merging only the provided fields.
    ///
    /// Returns `true` if the peer was new.
    pub fn add_or_update(
        &mut self,
        address: PeerAddress,
        metadata: Option<&PeerMetadata>,
        channel: Option<u8>,
        interface: Option<u8>,
    ) -> bool {
        let is_new = !self.peers.contains_key(&address);
        let peer = self.entry(address);
        if let Some(metadata) = metadata {
            peer.apply(metadata);
        }
        if let Some(channel) = channel {
            peer.channel = channel;
        }
        if let Some(interface) = interface {
            peer.interface = interface;
        }
        if is_new {
            info!("New peer {} ({})", address, peer.name.as_deref().unwrap_or("unnamed"));
        }
        is_new
    }

    pub fn remove(&mut self, address: &PeerAddress) -> Option<Peer> {
        self.peers.remove(address)
    }

    /// Name of a peer, registering unknown addresses as bare entries.
    pub fn lookup_name(&mut self, address: &PeerAddress) -> Option<String> {
        self.entry(*address).name.clone()
    }

    /// Record that a frame arrived from `address`.
    pub fn observe(&mut self, address: PeerAddress, rssi: Option<i16>, now_ms: u32) {
        let peer = self.entry(address);
        peer.last_seen = Some(now_ms);
        if rssi.is_some() {
            peer.rssi = rssi;
        }
    }

    /// Store a pong: metadata, round-trip time and ping time.
    pub fn record_pong(
        &mut self,
        address: PeerAddress,
        metadata: &PeerMetadata,
        rtt_ms: u32,
        now_ms: u32,
    ) {
        let peer = self.entry(address);
        peer.apply(metadata);
        peer.rtt_ms = Some(rtt_ms);
        peer.last_ping = Some(now_ms);
    }

    /// Cache sensor data, keeping the previous value.
    pub fn record_sensor_data(&mut self, address: PeerAddress, data: Payload) {
        let peer = self.entry(address);
        peer.previous_sensor_data = peer.sensor_data.replace(data);
    }

    /// Cache a proximity table broadcast by a peer.
    pub fn record_proximity(&mut self, address: PeerAddress, table: Value) {
        self.entry(address).proximity = Some(table);
    }

    pub fn get(&self, address: &PeerAddress) -> Option<&Peer> {
        self.peers.get(address)
    }

    pub fn contains(&self, address: &PeerAddress) -> bool {
        self.peers.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    /// Proximity table: live signal strength overlaid with registry metadata.
    ///
    /// Contains every address in `signal` plus every registered peer. Live
    /// readings take precedence over the last value the registry observed.
    pub fn snapshot(&self, signal: &SignalTable) -> BTreeMap<PeerAddress, PeerSnapshot> {
        let mut table: BTreeMap<PeerAddress, PeerSnapshot> = self
            .peers
            .values()
            .map(|peer| {
                (
                    peer.address,
                    PeerSnapshot {
                        name: peer.name.clone(),
                        rssi: peer.rssi,
                        last_seen: peer.last_seen,
                        channel: peer.channel,
                        rtt_ms: peer.rtt_ms,
                    },
                )
            })
            .collect();

        for (address, rssi) in signal {
            table
                .entry(*address)
                .and_modify(|row| row.rssi = Some(*rssi))
                .or_insert(PeerSnapshot {
                    name: None,
                    rssi: Some(*rssi),
                    last_seen: None,
                    channel: 0,
                    rtt_ms: None,
                });
        }
        table
    }

    /// Addresses whose live signal strength is strictly above `threshold_dbm`.
    pub fn peers_above(&self, threshold_dbm: i16, signal: &SignalTable) -> Vec<PeerAddress> {
        signal
            .iter()
            .filter(|(address, rssi)| **rssi > threshold_dbm && !address.is_broadcast())
            .map(|(address, _)| *address)
            .collect()
    }

    fn entry(&mut self, address: PeerAddress) -> &mut Peer {
        self.peers
            .entry(address)
            .or_insert_with(|| Peer::new(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const A: PeerAddress = PeerAddress::new([0x24, 0x6F, 0x28, 0x00, 0x00, 0x01]);
    const B: PeerAddress = PeerAddress::new([0x24, 0x6F, 0x28, 0x00, 0x00, 0x02]);
    const C: PeerAddress = PeerAddress::new([0x24, 0x6F, 0x28, 0x00, 0x00, 0x03]);

    // ==================== PeerAddress Tests ====================

    #[test]
    fn test_address_display_and_parse() {
        let addr: PeerAddress = "24:6f:28:aa:bb:cc".parse().unwrap();
        assert_eq!(addr.to_string(), "24:6F:28:AA:BB:CC");
        assert_eq!("246F28AABBCC".parse::<PeerAddress>().unwrap(), addr);
        assert_eq!("24-6F-28-AA-BB-CC".parse::<PeerAddress>().unwrap(), addr);
    }

    #[test]
    fn test_address_parse_errors() {
        assert!("".parse::<PeerAddress>().is_err());
        assert!("24:6F:28:AA:BB".parse::<PeerAddress>().is_err());
        assert!("24:6F:28:AA:BB:ZZ".parse::<PeerAddress>().is_err());
        assert!("24:6F:28:AA:BB:CC:DD".parse::<PeerAddress>().is_err());
    }

    #[test]
    fn test_broadcast() {
        assert!(PeerAddress::BROADCAST.is_broadcast());
        assert_eq!(PeerAddress::BROADCAST.to_string(), "FF:FF:FF:FF:FF:FF");
        assert!(!A.is_broadcast());
    }

    #[test]
    fn test_address_serde_as_string() {
        let json = serde_json::to_string(&A).unwrap();
        assert_eq!(json, "\"24:6F:28:00:00:01\"");
        let back: PeerAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, A);
    }

    // ==================== Registry Tests ====================

    #[test]
    fn test_add_then_merge() {
        let mut registry = PeerRegistry::new();
        let first = PeerMetadata {
            name: Some("hub".into()),
            version: Some("1.0".into()),
            ..Default::default()
        };
        assert!(registry.add_or_update(A, Some(&first), Some(6), None));

        let second = PeerMetadata {
            version: Some("1.1".into()),
            ..Default::default()
        };
        assert!(!registry.add_or_update(A, Some(&second), None, Some(1)));

        let peer = registry.get(&A).unwrap();
        assert_eq!(peer.name.as_deref(), Some("hub"));
        assert_eq!(peer.version.as_deref(), Some("1.1"));
        assert_eq!(peer.channel, 6);
        assert_eq!(peer.interface, 1);
    }

    #[test]
    fn test_lookup_registers_unknown() {
        let mut registry = PeerRegistry::new();
        assert_eq!(registry.lookup_name(&A), None);
        assert!(registry.contains(&A));

        registry.add_or_update(A, None, None, None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut registry = PeerRegistry::new();
        registry.add_or_update(A, None, None, None);
        assert!(registry.remove(&A).is_some());
        assert!(registry.remove(&A).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_observe_keeps_last_rssi() {
        let mut registry = PeerRegistry::new();
        registry.observe(A, Some(-40), 100);
        registry.observe(A, None, 200);
        let peer = registry.get(&A).unwrap();
        assert_eq!(peer.rssi, Some(-40));
        assert_eq!(peer.last_seen, Some(200));
    }

    #[test]
    fn test_sensor_data_keeps_previous() {
        let mut registry = PeerRegistry::new();
        registry.record_sensor_data(A, Payload::Int(1));
        registry.record_sensor_data(A, Payload::Int(2));
        let peer = registry.get(&A).unwrap();
        assert_eq!(peer.sensor_data, Some(Payload::Int(2)));
        assert_eq!(peer.previous_sensor_data, Some(Payload::Int(1)));
    }

    #[test]
    fn test_record_pong() {
        let mut registry = PeerRegistry::new();
        let metadata = PeerMetadata {
            name: Some("module".into()),
            channel: Some(1),
            ..Default::default()
        };
        registry.record_pong(B, &metadata, 12, 5_000);
        let peer = registry.get(&B).unwrap();
        assert_eq!(peer.rtt_ms, Some(12));
        assert_eq!(peer.last_ping, Some(5_000));
        assert_eq!(peer.channel, 1);
    }

    #[test]
    fn test_snapshot_overlays_signal_table() {
        let mut registry = PeerRegistry::new();
        registry.add_or_update(
            A,
            Some(&PeerMetadata {
                name: Some("hub".into()),
                ..Default::default()
            }),
            None,
            None,
        );
        registry.observe(A, Some(-80), 10);
        registry.observe(C, Some(-30), 20);

        let mut signal = SignalTable::new();
        signal.insert(A, -55);
        signal.insert(B, -60);

        let table = registry.snapshot(&signal);
        assert_eq!(table.len(), 3);
        assert_eq!(table[&A].rssi, Some(-55));
        assert_eq!(table[&A].name.as_deref(), Some("hub"));
        assert_eq!(table[&B].rssi, Some(-60));
        assert_eq!(table[&B].name, None);
        assert_eq!(table[&C].rssi, Some(-30));

        let value = serde_json::to_value(&table).unwrap();
        assert_eq!(value["24:6F:28:00:00:01"]["name"], json!("hub"));
    }

    #[test]
    fn test_peers_above_threshold() {
        let registry = PeerRegistry::new();
        let mut signal = SignalTable::new();
        signal.insert(A, -50);
        signal.insert(B, -65);
        signal.insert(C, -90);
        assert_eq!(registry.peers_above(-70, &signal), vec![A, B]);
        assert!(registry.peers_above(-40, &signal).is_empty());
    }

    #[test]
    fn test_metadata_serde_skips_missing_fields() {
        let metadata = PeerMetadata {
            name: Some("hub".into()),
            channel: Some(1),
            ..Default::default()
        };
        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value, json!({"name": "hub", "channel": 1}));

        let parsed: PeerMetadata = serde_json::from_value(json!({"id": "x1"})).unwrap();
        assert_eq!(parsed.id.as_deref(), Some("x1"));
        assert_eq!(parsed.name, None);
    }
}
