//! Node: the consumer API over the protocol core.
//!
//! A `Node` owns everything the protocol keeps between datagrams: the peer
//! registry, the reassembly buffer, the inbound queue, the identity and the
//! hooks. The transport's receive callback is the only producer of raw
//! datagrams and [`Node::poll`] the only consumer, so all of it is mutated
//! through `&mut self` from the main loop.
//!
//! Send path: value → payload codec → frame codec (fragmenting as needed) →
//! transport, with a bounded number of attempts per frame.
//!
//! Receive path: transport → [`Node::receive`] → frame codec → reassembly →
//! payload codec → dispatcher → built-in handling, hooks or inbound queue.
//!
//! # Example
//!
//! ```
//! use espnow_link::clock::ManualClock;
//! use espnow_link::config::NodeConfig;
//! use espnow_link::node::Node;
//! use espnow_link::peer::PeerAddress;
//! use espnow_link::platform::NoopPlatform;
//! use espnow_link::transport::MemoryNetwork;
//!
//! let network = MemoryNetwork::new();
//! let clock = ManualClock::new(0);
//! let a = PeerAddress::new([0, 0, 0, 0, 0, 1]);
//! let b = PeerAddress::new([0, 0, 0, 0, 0, 2]);
//!
//! let mut node_a =
//!     Node::with_parts(network.attach(a), NoopPlatform, clock.clone(), NodeConfig::default()).unwrap();
//! let mut node_b =
//!     Node::with_parts(network.attach(b), NoopPlatform, clock.clone(), NodeConfig::default()).unwrap();
//!
//! node_a.send(b, "hello").unwrap();
//! node_b.poll();
//!
//! let message = node_b.return_message().unwrap();
//! assert_eq!(message.source, a);
//! assert_eq!(message.payload.as_str(), Some("hello"));
//! ```

use crate::auth::elevate;
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, Identity, NodeConfig};
use crate::dispatch::{Action, DispatchContext, Dispatcher};
use crate::frame::{self, DecodeError, EncodeError, FrameBody, Reassembler};
use crate::message::{Command, Info, Message, MessageKind, Outgoing};
use crate::payload::Payload;
use crate::peer::{Peer, PeerAddress, PeerMetadata, PeerRegistry, PeerSnapshot};
use crate::platform::{NoopPlatform, Platform};
use crate::queue::{InboundQueue, QueuedMessage};
use crate::transport::{Datagram, SignalTable, Transport};
use log::{debug, error, info, warn};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Post-receive notification.
pub type IrqCallback = Box<dyn FnMut(&Message) + Send>;

/// Error type for Node operations.
#[derive(Debug)]
pub enum NodeError {
    /// Configuration rejected at construction.
    Config(ConfigError),
    /// Value cannot be framed (for example, too large to fragment).
    Encode(EncodeError),
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeError::Config(e) => write!(f, "configuration error: {}", e),
            NodeError::Encode(e) => write!(f, "encode error: {}", e),
        }
    }
}

impl std::error::Error for NodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NodeError::Config(e) => Some(e),
            NodeError::Encode(e) => Some(e),
        }
    }
}

impl From<ConfigError> for NodeError {
    fn from(e: ConfigError) -> Self {
        NodeError::Config(e)
    }
}

impl From<EncodeError> for NodeError {
    fn from(e: EncodeError) -> Self {
        NodeError::Encode(e)
    }
}

/// Link counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NodeStats {
    /// Datagrams handed to the transport successfully.
    pub frames_sent: u64,
    /// Frames not delivered after every attempt.
    pub send_failures: u64,
    /// Datagrams taken from the transport.
    pub frames_received: u64,
    /// Datagrams dropped by the frame or payload decoder.
    pub frames_dropped: u64,
    /// Logical messages handed to the dispatcher.
    pub messages_dispatched: u64,
}

/// A protocol endpoint.
pub struct Node<T: Transport, P: Platform = NoopPlatform, C: Clock = SystemClock> {
    transport: T,
    platform: P,
    clock: C,
    config: NodeConfig,
    registry: PeerRegistry,
    /// Unicast destinations registered with the transport.
    linked: BTreeSet<PeerAddress>,
    reassembler: Reassembler,
    queue: InboundQueue,
    dispatcher: Dispatcher,
    paused: bool,
    irq: Option<IrqCallback>,
    stats: NodeStats,
}

impl<T: Transport> Node<T> {
    /// Create a host node with no platform side effects and the system clock.
    pub fn new(transport: T, config: NodeConfig) -> Result<Self, NodeError> {
        Self::with_parts(transport, NoopPlatform, SystemClock::new(), config)
    }
}

impl<T: Transport, P: Platform, C: Clock> Node<T, P, C> {
    /// Create a node from its parts. The configuration is validated first.
    pub fn with_parts(
        transport: T,
        platform: P,
        clock: C,
        config: NodeConfig,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        info!(
            "Node {} ({}) on channel {}",
            config.identity.name,
            transport.local_address(),
            config.channel
        );
        Ok(Self {
            reassembler: Reassembler::new(config.reassembly),
            queue: InboundQueue::new(config.queue),
            transport,
            platform,
            clock,
            config,
            registry: PeerRegistry::new(),
            linked: BTreeSet::new(),
            dispatcher: Dispatcher::new(),
            paused: false,
            irq: None,
            stats: NodeStats::default(),
        })
    }

    /// This node's link address.
    pub fn local_address(&self) -> PeerAddress {
        self.transport.local_address()
    }

    pub fn identity(&self) -> &Identity {
        &self.config.identity
    }

    /// Senders allowed to run administrative commands here.
    pub fn trust(&self) -> &[PeerAddress] {
        &self.config.identity.trusted
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn stats(&self) -> NodeStats {
        self.stats
    }

    /// Set by a `Pause` command, cleared by `Resume`.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    // ==================== Peers ====================

    /// Register a peer with the registry and the radio.
    ///
    /// Returns `true` if the peer was new.
    pub fn add_peer(&mut self, address: PeerAddress, metadata: Option<&PeerMetadata>) -> bool {
        let is_new = self.registry.add_or_update(address, metadata, None, None);
        if let Some(peer) = self.registry.get(&address) {
            let (channel, interface) = (peer.channel, peer.interface);
            if self.transport.register_peer(&address, channel, interface) {
                self.linked.insert(address);
            } else {
                warn!("Transport refused peer {}", address);
            }
        }
        is_new
    }

    /// Forget a peer in the registry and the radio, including its live
    /// signal-strength entry.
    pub fn remove_peer(&mut self, address: &PeerAddress) -> Option<Peer> {
        self.linked.remove(address);
        self.transport.unregister_peer(address);
        self.registry.remove(address)
    }

    pub fn peer(&self, address: &PeerAddress) -> Option<&Peer> {
        self.registry.get(address)
    }

    /// Name of a peer. Unknown addresses become bare registry entries.
    pub fn peer_name(&mut self, address: &PeerAddress) -> Option<String> {
        self.registry.lookup_name(address)
    }

    /// Proximity table: live signal strength with registry metadata.
    pub fn peers(&self) -> BTreeMap<PeerAddress, PeerSnapshot> {
        self.registry.snapshot(&self.transport.signal_strength())
    }

    /// Live signal strength per address.
    pub fn rssi(&self) -> SignalTable {
        self.transport.signal_strength()
    }

    // ==================== Sending ====================

    /// Ping a peer with our metadata. The pong updates its round-trip time.
    pub fn ping(&mut self, dest: PeerAddress) -> Result<bool, NodeError> {
        let metadata = self.config.identity.metadata(self.config.channel, self.config.interface);
        let payload = serde_json::to_value(&metadata)
            .map(Payload::Structured)
            .unwrap_or(Payload::None);
        self.send_message(dest, MessageKind::Command(Command::Ping), payload)
    }

    /// Ask a peer to send the payload back.
    pub fn echo(&mut self, dest: PeerAddress, payload: impl Into<Payload>) -> Result<bool, NodeError> {
        self.send_message(dest, MessageKind::Command(Command::Echo), payload.into())
    }

    /// Ask a peer for its proximity table.
    pub fn boop(&mut self, dest: PeerAddress) -> Result<bool, NodeError> {
        self.send_message(dest, MessageKind::Command(Command::Boop), Payload::None)
    }

    /// Send an application message. Use [`PeerAddress::BROADCAST`] for everyone.
    pub fn send(&mut self, dest: PeerAddress, payload: impl Into<Payload>) -> Result<bool, NodeError> {
        self.send_message(dest, MessageKind::Info(Info::Message), payload.into())
    }

    /// Send structured sensor data.
    pub fn send_data(&mut self, dest: PeerAddress, data: Value) -> Result<bool, NodeError> {
        self.send_message(dest, MessageKind::Info(Info::SensorData), Payload::Structured(data))
    }

    /// Send a command. An admin node marks administrative commands as elevated.
    pub fn send_command(
        &mut self,
        dest: PeerAddress,
        command: Command,
        payload: impl Into<Payload>,
    ) -> Result<bool, NodeError> {
        let mut payload = payload.into();
        if command.is_admin() && self.config.identity.admin {
            payload = elevate(payload);
        }
        self.send_message(dest, MessageKind::Command(command), payload)
    }

    /// Send an application message to every peer heard above `threshold_dbm`.
    ///
    /// Returns the peers the message was delivered to.
    pub fn send_to_peers_above(
        &mut self,
        threshold_dbm: i16,
        payload: impl Into<Payload>,
    ) -> Result<Vec<PeerAddress>, NodeError> {
        let payload = payload.into();
        let signal = self.transport.signal_strength();
        let targets = self.registry.peers_above(threshold_dbm, &signal);
        let mut reached = Vec::with_capacity(targets.len());
        for dest in targets {
            if self.send_message(dest, MessageKind::Info(Info::Message), payload.clone())? {
                reached.push(dest);
            }
        }
        Ok(reached)
    }

    /// Send any message.
    ///
    /// Returns `Ok(false)` if any frame was not delivered, `Err` if the value
    /// cannot be framed.
    pub fn send_message(
        &mut self,
        dest: PeerAddress,
        kind: MessageKind,
        payload: Payload,
    ) -> Result<bool, NodeError> {
        let (tag, bytes) = payload.encode(self.config.number_encoding);
        let frames = frame::encode(kind, self.clock.now_ms(), tag, &bytes)?;

        // Peers first heard over the air are in the registry but not yet
        // known to the radio.
        if !dest.is_broadcast() && !self.linked.contains(&dest) {
            self.add_peer(dest, None);
        }

        let mut delivered = true;
        for raw in &frames {
            if self.transmit(&dest, raw) {
                self.stats.frames_sent += 1;
            } else {
                self.stats.send_failures += 1;
                delivered = false;
            }
        }
        if !delivered {
            warn!("{} to {} not delivered", kind, dest);
        }
        Ok(delivered)
    }

    /// One frame, up to `send_attempts` tries.
    fn transmit(&mut self, dest: &PeerAddress, raw: &[u8]) -> bool {
        let attempts = self.config.send_attempts.max(1);
        (0..attempts).any(|_| self.transport.send(dest, raw))
    }

    // ==================== Receiving ====================

    /// Process every datagram the transport has buffered and expire stale
    /// reassemblies. Returns the number of datagrams processed.
    pub fn poll(&mut self) -> usize {
        let mut processed = 0;
        while let Some(datagram) = self.transport.recv() {
            self.receive(datagram);
            processed += 1;
        }
        let expired = self.reassembler.expire(self.clock.now_ms());
        if expired > 0 {
            debug!("Expired {} incomplete messages", expired);
        }
        processed
    }

    /// Process one datagram. Corrupt or foreign datagrams are dropped.
    pub fn receive(&mut self, datagram: Datagram) {
        self.stats.frames_received += 1;
        let now = self.clock.now_ms();

        let frame = match frame::decode(&datagram.data) {
            Ok(frame) => frame,
            Err(e) => {
                self.drop_datagram(&datagram, e);
                return;
            }
        };
        self.registry.observe(datagram.source, datagram.rssi, now);

        let (kind, sent_at, tag, bytes) = match frame.body {
            FrameBody::Single(bytes) => (
                frame.header.kind,
                frame.header.timestamp,
                frame.header.tag,
                bytes,
            ),
            FrameBody::Chunk(chunk) => {
                match self
                    .reassembler
                    .add_chunk(datagram.source, &frame.header, chunk, now)
                {
                    Some(complete) => (complete.kind, complete.timestamp, complete.tag, complete.payload),
                    None => return,
                }
            }
        };

        let payload = match Payload::decode(tag, &bytes, self.config.number_encoding) {
            Ok(payload) => payload,
            Err(e) => {
                self.drop_datagram(&datagram, e);
                return;
            }
        };

        self.dispatch(Message {
            source: datagram.source,
            kind,
            sent_at,
            received_at: now,
            rssi: datagram.rssi,
            payload,
        });
    }

    fn drop_datagram(&mut self, datagram: &Datagram, reason: DecodeError) {
        self.stats.frames_dropped += 1;
        debug!(
            "Dropped {} bytes from {}: {}",
            datagram.data.len(),
            datagram.source,
            reason
        );
    }

    fn dispatch(&mut self, message: Message) {
        self.stats.messages_dispatched += 1;
        let notify = self.irq.as_ref().map(|_| message.clone());

        let signal = self.transport.signal_strength();
        let mut ctx = DispatchContext {
            identity: &mut self.config.identity,
            channel: self.config.channel,
            interface: self.config.interface,
            registry: &mut self.registry,
            queue: &mut self.queue,
            platform: &mut self.platform,
            paused: &mut self.paused,
            signal: &signal,
        };
        let actions = self.dispatcher.dispatch(&mut ctx, message);

        for action in actions {
            match action {
                Action::Send(out) => {
                    if let Err(e) = self.send_message(out.dest, out.kind, out.payload) {
                        warn!("Reply to {} failed: {}", out.dest, e);
                    }
                }
                Action::Reboot => {
                    if let Err(e) = self.platform.reboot() {
                        error!("Reboot failed: {}", e);
                    }
                }
            }
        }

        if let (Some(irq), Some(message)) = (self.irq.as_mut(), notify) {
            irq(&message);
        }
    }

    // ==================== Inbound Queue ====================

    /// Number of queued application messages.
    pub fn check_messages(&self) -> usize {
        self.queue.len()
    }

    /// Oldest queued message.
    pub fn return_message(&mut self) -> Option<QueuedMessage> {
        self.queue.pop()
    }

    /// Every queued message, oldest first.
    pub fn return_messages(&mut self) -> Vec<QueuedMessage> {
        self.queue.drain()
    }

    /// Incomplete fragmented messages being reassembled.
    pub fn pending_reassemblies(&self) -> usize {
        self.reassembler.pending_count()
    }

    // ==================== Hooks ====================

    /// Called after every dispatched message.
    pub fn irq(&mut self, callback: impl FnMut(&Message) + Send + 'static) {
        self.irq = Some(Box::new(callback));
    }

    /// Handler for application-defined command subtypes.
    pub fn on_command(
        &mut self,
        hook: impl FnMut(&Message) -> Option<Outgoing> + Send + 'static,
    ) {
        self.dispatcher.set_command_hook(Box::new(hook));
    }

    /// Handler for application-defined info subtypes.
    pub fn on_info(&mut self, hook: impl FnMut(&Message) -> Option<Outgoing> + Send + 'static) {
        self.dispatcher.set_info_hook(Box::new(hook));
    }

    /// Handler for application-defined ack subtypes.
    pub fn on_ack(&mut self, hook: impl FnMut(&Message) -> Option<Outgoing> + Send + 'static) {
        self.dispatcher.set_ack_hook(Box::new(hook));
    }
}
