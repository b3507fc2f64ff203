//! Device side effects requested by administrative commands.
//!
//! The protocol core decides *whether* a command runs; a [`Platform`] does
//! the work. Every method defaults to [`PlatformError::Unsupported`], so a
//! host tool only implements what it can do.
//!
//! - **ESP32** (`esp32` feature): [`EspPlatform`] restarts the chip and drives
//!   the Wi-Fi driver
//! - **Host**: [`NoopPlatform`] logs and refuses

use crate::config::Identity;
use log::info;
use std::fmt;

mod wifi;

#[cfg(feature = "esp32")]
mod esp32;

pub use wifi::{CredentialsError, WifiCredentials, MAX_PASSWORD_LEN, MAX_SSID_LEN, MIN_PASSWORD_LEN};

#[cfg(feature = "esp32")]
pub use esp32::EspPlatform;

/// Hardware and OS hooks used by the built-in command handlers.
pub trait Platform {
    /// Restart the device. Called after the confirmation has been sent.
    fn reboot(&mut self) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported("reboot"))
    }

    /// Execute a local script or program.
    fn run_file(&mut self, _path: &str) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported("run file"))
    }

    fn wifi_connect(&mut self, _credentials: &WifiCredentials) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported("wifi connect"))
    }

    fn wifi_disconnect(&mut self) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported("wifi disconnect"))
    }

    /// Start a soft access point. `None` means the device's default SSID.
    fn access_point_enable(
        &mut self,
        _credentials: Option<&WifiCredentials>,
    ) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported("access point"))
    }

    fn access_point_disable(&mut self) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported("access point"))
    }

    /// Identity or trust list changed; persist it if the device can.
    fn identity_changed(&mut self, _identity: &Identity) {}
}

/// Platform that performs no side effects.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPlatform;

impl Platform for NoopPlatform {
    fn identity_changed(&mut self, identity: &Identity) {
        info!("Identity changed: {}", identity.name);
    }
}

/// Errors from platform side effects. Sent back to the requester in a `Fail`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// This platform cannot perform the operation.
    Unsupported(&'static str),
    /// Command payload is unusable.
    InvalidArgument(String),
    /// The operation was attempted and failed.
    Failed(String),
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported(what) => write!(f, "{} not supported", what),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Self::Failed(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for PlatformError {}

impl From<CredentialsError> for PlatformError {
    fn from(e: CredentialsError) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_refuses_side_effects() {
        let mut platform = NoopPlatform;
        assert_eq!(platform.reboot(), Err(PlatformError::Unsupported("reboot")));
        assert!(platform.run_file("main.py").is_err());
        assert!(platform.wifi_disconnect().is_err());
        assert!(platform.access_point_enable(None).is_err());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            PlatformError::Unsupported("reboot").to_string(),
            "reboot not supported"
        );
        let e: PlatformError = CredentialsError::SsidEmpty.into();
        assert_eq!(e.to_string(), "invalid argument: SSID cannot be empty");
    }
}
