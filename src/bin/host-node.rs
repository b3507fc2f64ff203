//! Host-based simulation of a small ESP-NOW network.
//!
//! Runs a hub and two modules on an in-process medium and exercises the
//! protocol: pings, an application message, a fragmented payload, an admin
//! command and a proximity-gated broadcast.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin host-node
//! cargo run --bin host-node -- path/to/hub.json
//! ```

use espnow_link::{
    Command, MemoryNetwork, MemoryTransport, Node, NodeConfig, NodeError, PeerAddress,
};
use log::{error, info};
use serde_json::json;
use std::path::Path;
use std::thread;
use std::time::Duration;

const HUB: PeerAddress = PeerAddress::new([0x24, 0x6F, 0x28, 0x00, 0x00, 0x01]);
const NEAR: PeerAddress = PeerAddress::new([0x24, 0x6F, 0x28, 0x00, 0x00, 0x02]);
const FAR: PeerAddress = PeerAddress::new([0x24, 0x6F, 0x28, 0x00, 0x00, 0x03]);

type HostNode = Node<MemoryTransport>;

fn module(network: &MemoryNetwork, address: PeerAddress, name: &str) -> Result<HostNode, NodeError> {
    let mut config = NodeConfig::default();
    config.identity.name = name.to_string();
    config.identity.trusted.push(HUB);
    Node::new(network.attach(address), config)
}

/// Let every node drain its inbox until the medium is quiet.
fn settle(nodes: &mut [&mut HostNode]) {
    loop {
        let processed: usize = nodes.iter_mut().map(|n| n.poll()).sum();
        if processed == 0 {
            break;
        }
        thread::sleep(Duration::from_millis(2));
    }
}

fn run(hub_config: NodeConfig) -> Result<(), NodeError> {
    let network = MemoryNetwork::new();
    network.set_rssi(HUB, NEAR, -48);
    network.set_rssi(HUB, FAR, -86);

    let mut hub = Node::new(network.attach(HUB), hub_config)?;
    let mut near = module(&network, NEAR, "near-module")?;
    let mut far = module(&network, FAR, "far-module")?;

    info!("Pinging modules");
    hub.ping(NEAR)?;
    hub.ping(FAR)?;
    settle(&mut [&mut hub, &mut near, &mut far]);
    for (address, row) in hub.peers() {
        info!(
            "  {} {:<12} rssi {:?} rtt {:?} ms",
            address,
            row.name.as_deref().unwrap_or("?"),
            row.rssi,
            row.rtt_ms
        );
    }

    info!("Sending a fragmented payload");
    let readings: Vec<u32> = (0..300).collect();
    near.send_data(HUB, json!({ "samples": readings }))?;
    settle(&mut [&mut hub, &mut near, &mut far]);
    if let Some(peer) = hub.peer(&NEAR) {
        info!("  hub cached sensor data from {}: {}", NEAR, peer.sensor_data.is_some());
    }

    info!("Renaming the far module");
    hub.send_command(FAR, Command::SetName, "lantern")?;
    settle(&mut [&mut hub, &mut near, &mut far]);
    info!("  far module is now {}", far.identity().name);

    info!("Messaging modules above -70 dBm");
    let reached = hub.send_to_peers_above(-70, "hello, neighbour")?;
    settle(&mut [&mut hub, &mut near, &mut far]);
    info!("  reached {:?}", reached);
    for message in near.return_messages() {
        info!("  near module got {:?} from {}", message.payload, message.source);
    }
    info!("  far module has {} messages", far.check_messages());

    info!("Hub stats: {:?}", hub.stats());
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("=== ESP-NOW host simulation starting ===");

    let hub_config = match std::env::args().nth(1) {
        Some(path) => match NodeConfig::load_from(Path::new(&path)) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => {
            let mut config = NodeConfig::default();
            config.identity.name = "hub".to_string();
            config
        }
    };

    if let Err(e) = run(hub_config) {
        error!("Simulation failed: {}", e);
        std::process::exit(1);
    }
}
