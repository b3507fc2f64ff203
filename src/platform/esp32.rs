//! ESP32 platform: chip restart and Wi-Fi control.

use super::{Platform, PlatformError, WifiCredentials};
use crate::config::Identity;
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, BlockingWifi, ClientConfiguration, Configuration,
    EspWifi,
};
use esp_idf_sys::EspError;
use log::{info, warn};

/// SSID used when the access-point command carries none.
pub const DEFAULT_AP_SSID: &str = "espnow-link";

impl From<EspError> for PlatformError {
    fn from(e: EspError) -> Self {
        Self::Failed(format!("ESP error: {:?}", e))
    }
}

/// Platform backed by the ESP-IDF Wi-Fi driver.
///
/// The driver is shared with ESP-NOW, so it stays started; connecting and
/// enabling the access point only change its configuration.
pub struct EspPlatform<'a> {
    wifi: BlockingWifi<EspWifi<'a>>,
    client: Option<ClientConfiguration>,
    access_point: Option<AccessPointConfiguration>,
}

impl<'a> EspPlatform<'a> {
    /// Take ownership of a started Wi-Fi driver.
    pub fn new(wifi: BlockingWifi<EspWifi<'a>>) -> Self {
        Self {
            wifi,
            client: None,
            access_point: None,
        }
    }

    fn apply(&mut self) -> Result<(), PlatformError> {
        let configuration = match (&self.client, &self.access_point) {
            (Some(client), Some(ap)) => Configuration::Mixed(client.clone(), ap.clone()),
            (Some(client), None) => Configuration::Client(client.clone()),
            (None, Some(ap)) => Configuration::AccessPoint(ap.clone()),
            (None, None) => Configuration::Client(ClientConfiguration::default()),
        };
        self.wifi.set_configuration(&configuration)?;
        Ok(())
    }
}

fn auth_method(credentials: &WifiCredentials) -> AuthMethod {
    if credentials.is_open() {
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    }
}

fn invalid(what: &str) -> PlatformError {
    PlatformError::InvalidArgument(format!("invalid {}", what))
}

impl Platform for EspPlatform<'_> {
    fn reboot(&mut self) -> Result<(), PlatformError> {
        info!("Restarting");
        esp_idf_svc::hal::reset::restart();
    }

    fn wifi_connect(&mut self, credentials: &WifiCredentials) -> Result<(), PlatformError> {
        info!("Connecting to WiFi: {}", credentials.ssid);
        self.client = Some(ClientConfiguration {
            ssid: credentials
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| invalid("SSID"))?,
            password: credentials
                .password
                .as_str()
                .try_into()
                .map_err(|_| invalid("password"))?,
            auth_method: auth_method(credentials),
            ..Default::default()
        });
        self.apply()?;
        self.wifi.connect()?;
        self.wifi.wait_netif_up()?;
        Ok(())
    }

    fn wifi_disconnect(&mut self) -> Result<(), PlatformError> {
        info!("Disconnecting from WiFi");
        if let Err(e) = self.wifi.disconnect() {
            warn!("WiFi disconnect: {:?}", e);
        }
        self.client = None;
        self.apply()
    }

    fn access_point_enable(
        &mut self,
        credentials: Option<&WifiCredentials>,
    ) -> Result<(), PlatformError> {
        let ssid = credentials.map_or(DEFAULT_AP_SSID, |c| c.ssid.as_str());
        info!("Enabling access point {}", ssid);
        let mut ap = AccessPointConfiguration {
            ssid: ssid.try_into().map_err(|_| invalid("SSID"))?,
            ..Default::default()
        };
        if let Some(credentials) = credentials {
            ap.password = credentials
                .password
                .as_str()
                .try_into()
                .map_err(|_| invalid("password"))?;
            ap.auth_method = auth_method(credentials);
        }
        self.access_point = Some(ap);
        self.apply()
    }

    fn access_point_disable(&mut self) -> Result<(), PlatformError> {
        info!("Disabling access point");
        self.access_point = None;
        self.apply()
    }

    fn identity_changed(&mut self, identity: &Identity) {
        // NVS persistence belongs to the firmware image.
        info!("Identity changed: {}", identity.name);
    }
}
