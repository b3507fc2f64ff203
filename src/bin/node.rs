//! ESP-NOW node firmware.
//!
//! - **ESP32**: `cargo espflash flash --bin node --features esp32 --release`
//! - **Host**: use `cargo run --bin host-node` for a simulated network
//!
//! The node broadcasts a discovery ping every few seconds, answers
//! commands from its peers and logs application messages. A `Pause`
//! command suspends discovery until `Resume` arrives.

use log::info;

/// Interval between discovery pings.
#[cfg(feature = "esp32")]
const DISCOVERY_INTERVAL_MS: u32 = 5_000;

// ESP32: Initialize ESP-IDF before anything else
#[cfg(feature = "esp32")]
fn platform_init() {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    info!("ESP-IDF initialized");
}

// Host: Just initialize env_logger
#[cfg(not(feature = "esp32"))]
fn platform_init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

#[cfg(feature = "esp32")]
fn run() -> Result<(), Box<dyn std::error::Error>> {
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::wifi::{BlockingWifi, ClientConfiguration, Configuration, EspWifi};
    use espnow_link::{
        Clock, EspNowTransport, EspPlatform, Node, NodeConfig, PeerAddress, SystemClock,
    };
    use log::error;
    use std::time::Duration;

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    // ESP-NOW rides on the Wi-Fi driver, which must be started first.
    let mut wifi = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sysloop.clone(), Some(nvs))?,
        sysloop,
    )?;
    wifi.set_configuration(&Configuration::Client(ClientConfiguration::default()))?;
    wifi.start()?;
    let address = PeerAddress::new(wifi.wifi().sta_netif().get_mac()?);
    info!("Station MAC {}", address);

    let clock = SystemClock::new();
    let mut node = Node::with_parts(
        EspNowTransport::new(address)?,
        EspPlatform::new(wifi),
        clock,
        NodeConfig::default(),
    )?;

    info!("Entering main loop...");
    let mut last_discovery: Option<u32> = None;
    loop {
        node.poll();

        let now = clock.now_ms();
        let due = last_discovery.map_or(true, |t| now.wrapping_sub(t) >= DISCOVERY_INTERVAL_MS);
        if due && !node.is_paused() {
            if let Err(e) = node.ping(PeerAddress::BROADCAST) {
                error!("Discovery ping failed: {}", e);
            }
            last_discovery = Some(now);
        }

        for message in node.return_messages() {
            info!("Message from {}: {:?}", message.source, message.payload);
        }

        std::thread::sleep(Duration::from_millis(10));
    }
}

#[cfg(feature = "esp32")]
fn main() {
    platform_init();
    info!("=== ESP-NOW node starting ===");
    if let Err(e) = run() {
        log::error!("Fatal: {}", e);
    }
}

#[cfg(not(feature = "esp32"))]
fn main() {
    platform_init();
    info!("This binary requires the 'esp32' feature.");
    info!("Use 'cargo run --bin host-node' for a host simulation.");
}
