//! Node configuration.
//!
//! Everything a node needs before it joins the link: its identity (name, id,
//! opaque config blob, version, admin flag, trust list), radio settings and
//! resource limits. Every field has a default, so an empty JSON object is a
//! valid configuration.
//!
//! # Example
//!
//! ```
//! use espnow_link::config::NodeConfig;
//!
//! let config = NodeConfig::from_json(r#"{
//!     "identity": { "name": "hub", "trusted": ["24:6F:28:AA:BB:CC"] },
//!     "channel": 1,
//!     "queue": { "max_messages": 64 }
//! }"#).unwrap();
//!
//! assert_eq!(config.identity.name, "hub");
//! assert_eq!(config.queue.max_messages, 64);
//! assert_eq!(config.send_attempts, 3);
//! ```

use crate::frame::ReassemblyConfig;
use crate::payload::NumberEncoding;
use crate::peer::{PeerAddress, PeerMetadata};
use crate::queue::QueueConfig;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

/// Default node name.
pub const DEFAULT_NAME: &str = "espnow-node";

/// Default number of transmit attempts per frame.
pub const DEFAULT_SEND_ATTEMPTS: u8 = 3;

/// Who this node is, as advertised in pings and changed by admin commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Identity {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Opaque application configuration blob.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    pub version: String,
    /// Commands sent by an admin node carry the elevated marker.
    pub admin: bool,
    /// Senders allowed to run administrative commands here.
    pub trusted: Vec<PeerAddress>,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            id: None,
            config: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            admin: false,
            trusted: Vec::new(),
        }
    }
}

impl Identity {
    /// Metadata advertised in pings and pongs.
    pub fn metadata(&self, channel: u8, interface: u8) -> PeerMetadata {
        PeerMetadata {
            name: Some(self.name.clone()),
            id: self.id.clone(),
            config: self.config.clone(),
            version: Some(self.version.clone()),
            channel: Some(channel),
            interface: Some(interface),
        }
    }

    pub fn is_trusted(&self, address: &PeerAddress) -> bool {
        self.trusted.contains(address)
    }

    /// Add a trusted sender. Returns `false` if it was already present.
    pub fn trust(&mut self, address: PeerAddress) -> bool {
        if self.is_trusted(&address) {
            return false;
        }
        self.trusted.push(address);
        true
    }
}

/// Complete node configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub identity: Identity,
    /// Radio channel (0 means "current channel").
    pub channel: u8,
    /// Radio interface index.
    pub interface: u8,
    /// Transmit attempts per frame before giving up.
    pub send_attempts: u8,
    pub number_encoding: NumberEncoding,
    pub reassembly: ReassemblyConfig,
    pub queue: QueueConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            identity: Identity::default(),
            channel: 0,
            interface: 0,
            send_attempts: DEFAULT_SEND_ATTEMPTS,
            number_encoding: NumberEncoding::default(),
            reassembly: ReassemblyConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Json(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(ConfigError::Io)?;
        let config = Self::from_json(&json)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Json(e.to_string()))?;
        fs::write(path, json).map_err(ConfigError::Io)?;
        info!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity.name.is_empty() {
            return Err(ConfigError::InvalidConfig("identity name must not be empty"));
        }
        if self.channel > 14 {
            return Err(ConfigError::InvalidConfig("channel must be 0..=14"));
        }
        if self.send_attempts == 0 {
            return Err(ConfigError::InvalidConfig(
                "send_attempts must be greater than 0",
            ));
        }
        self.reassembly.validate().map_err(ConfigError::InvalidConfig)?;
        self.queue.validate().map_err(ConfigError::InvalidConfig)?;
        Ok(())
    }
}

/// Errors loading or validating a configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// File could not be read or written.
    Io(io::Error),
    /// Malformed JSON or wrong field types.
    Json(String),
    /// A value is out of range.
    InvalidConfig(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Json(msg) => write!(f, "invalid JSON: {}", msg),
            Self::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        let config = NodeConfig::from_json("{}").unwrap();
        assert_eq!(config, NodeConfig::default());
        assert_eq!(config.identity.name, DEFAULT_NAME);
        assert_eq!(config.reassembly.timeout_ms, 10_000);
        assert_eq!(config.queue.max_bytes, 20_000);
        assert_eq!(config.number_encoding, NumberEncoding::Binary);
    }

    #[test]
    fn test_partial_sections() {
        let config = NodeConfig::from_json(
            r#"{"number_encoding": "ascii", "reassembly": {"max_entries": 2}}"#,
        )
        .unwrap();
        assert_eq!(config.number_encoding, NumberEncoding::Ascii);
        assert_eq!(config.reassembly.max_entries, 2);
        assert_eq!(config.reassembly.max_bytes, 75_000);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            NodeConfig::from_json(r#"{"send_attempts": 0}"#),
            Err(ConfigError::InvalidConfig(_))
        ));
        assert!(matches!(
            NodeConfig::from_json(r#"{"channel": 15}"#),
            Err(ConfigError::InvalidConfig(_))
        ));
        assert!(matches!(
            NodeConfig::from_json(r#"{"identity": {"trusted": ["nope"]}}"#),
            Err(ConfigError::Json(_))
        ));
        assert!(matches!(
            NodeConfig::from_json("not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_trust() {
        let mut identity = Identity::default();
        let addr = PeerAddress::new([1, 2, 3, 4, 5, 6]);
        assert!(identity.trust(addr));
        assert!(!identity.trust(addr));
        assert!(identity.is_trusted(&addr));
        assert_eq!(identity.trusted.len(), 1);
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("espnow-link-config-{}", std::process::id()));
        let path = dir.join("node.json");
        let mut config = NodeConfig::default();
        config.identity.name = "module-7".to_string();
        config.channel = 6;
        config.save_to(&path).unwrap();

        let loaded = NodeConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_missing_file() {
        let path = Path::new("/nonexistent/espnow-link/node.json");
        assert!(matches!(NodeConfig::load_from(path), Err(ConfigError::Io(_))));
    }
}
