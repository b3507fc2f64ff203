//! Wi-Fi credentials carried by the connect and access-point commands.
//!
//! # Example
//!
//! ```
//! use espnow_link::platform::WifiCredentials;
//!
//! let creds = WifiCredentials::new("Workshop", "password123").unwrap();
//! assert!(!creds.is_open());
//! assert!(WifiCredentials::new("", "password123").is_err());
//! ```

use crate::payload::Payload;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum SSID length per IEEE 802.11 standard.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum password length for WPA2.
pub const MAX_PASSWORD_LEN: usize = 64;

/// Minimum password length for WPA2.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Network name and password. The password is wiped on drop.
#[derive(Clone, PartialEq, Eq, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct WifiCredentials {
    /// Network SSID (1-32 bytes).
    pub ssid: String,
    /// Network password (8-64 bytes for WPA2, empty for open networks).
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for WifiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WifiCredentials")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl WifiCredentials {
    /// Create validated credentials.
    pub fn new(
        ssid: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, CredentialsError> {
        let creds = Self {
            ssid: ssid.into(),
            password: password.into(),
        };
        creds.validate()?;
        Ok(creds)
    }

    /// Credentials for an open network.
    pub fn open(ssid: impl Into<String>) -> Result<Self, CredentialsError> {
        Self::new(ssid, String::new())
    }

    /// Check SSID and password lengths.
    pub fn validate(&self) -> Result<(), CredentialsError> {
        if self.ssid.is_empty() {
            return Err(CredentialsError::SsidEmpty);
        }
        if self.ssid.len() > MAX_SSID_LEN {
            return Err(CredentialsError::SsidTooLong {
                len: self.ssid.len(),
                max: MAX_SSID_LEN,
            });
        }
        if !self.password.is_empty() && self.password.len() < MIN_PASSWORD_LEN {
            return Err(CredentialsError::PasswordTooShort {
                len: self.password.len(),
                min: MIN_PASSWORD_LEN,
            });
        }
        if self.password.len() > MAX_PASSWORD_LEN {
            return Err(CredentialsError::PasswordTooLong {
                len: self.password.len(),
                max: MAX_PASSWORD_LEN,
            });
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }

    /// Read credentials from a command payload.
    ///
    /// Accepts `{"ssid": .., "password": ..}`, `[ssid, password]`, `[ssid]`
    /// or a bare SSID string.
    pub fn from_payload(payload: &Payload) -> Result<Self, CredentialsError> {
        let creds = match payload {
            Payload::Str(ssid) => Self {
                ssid: ssid.clone(),
                password: String::new(),
            },
            Payload::Structured(Value::Array(items)) => {
                let field = |i: usize| -> Result<String, CredentialsError> {
                    match items.get(i) {
                        None => Ok(String::new()),
                        Some(Value::String(s)) => Ok(s.clone()),
                        Some(_) => Err(CredentialsError::InvalidFormat),
                    }
                };
                if items.len() > 2 {
                    return Err(CredentialsError::InvalidFormat);
                }
                Self {
                    ssid: field(0)?,
                    password: field(1)?,
                }
            }
            Payload::Structured(value @ Value::Object(_)) => {
                Self::deserialize(value).map_err(|_| CredentialsError::InvalidFormat)?
            }
            _ => return Err(CredentialsError::InvalidFormat),
        };
        creds.validate()?;
        Ok(creds)
    }
}

/// Errors validating Wi-Fi credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialsError {
    /// SSID is empty.
    SsidEmpty,
    /// SSID exceeds maximum length.
    SsidTooLong { len: usize, max: usize },
    /// Password is too short for WPA2.
    PasswordTooShort { len: usize, min: usize },
    /// Password exceeds maximum length.
    PasswordTooLong { len: usize, max: usize },
    /// Payload is not a credentials object, list or string.
    InvalidFormat,
}

impl fmt::Display for CredentialsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidEmpty => write!(f, "SSID cannot be empty"),
            Self::SsidTooLong { len, max } => {
                write!(f, "SSID too long: {} bytes (max {})", len, max)
            }
            Self::PasswordTooShort { len, min } => {
                write!(f, "password too short: {} bytes (min {})", len, min)
            }
            Self::PasswordTooLong { len, max } => {
                write!(f, "password too long: {} bytes (max {})", len, max)
            }
            Self::InvalidFormat => write!(f, "expected ssid and password"),
        }
    }
}

impl std::error::Error for CredentialsError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_credentials() {
        let creds = WifiCredentials::new("TestNetwork", "password123").unwrap();
        assert_eq!(creds.ssid, "TestNetwork");
        assert!(!creds.is_open());
    }

    #[test]
    fn test_open_network() {
        assert!(WifiCredentials::open("OpenNetwork").unwrap().is_open());
    }

    #[test]
    fn test_length_limits() {
        assert_eq!(
            WifiCredentials::new("", "password123"),
            Err(CredentialsError::SsidEmpty)
        );
        assert!(matches!(
            WifiCredentials::new("a".repeat(33), "password123"),
            Err(CredentialsError::SsidTooLong { .. })
        ));
        assert!(WifiCredentials::new("a".repeat(32), "12345678").is_ok());
        assert!(matches!(
            WifiCredentials::new("net", "short"),
            Err(CredentialsError::PasswordTooShort { .. })
        ));
        assert!(matches!(
            WifiCredentials::new("net", "a".repeat(65)),
            Err(CredentialsError::PasswordTooLong { .. })
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = WifiCredentials::new("net", "hunter2hunter2").unwrap();
        let debug = format!("{:?}", creds);
        assert!(debug.contains("net"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_from_payload_shapes() {
        let object = Payload::Structured(json!({"ssid": "net", "password": "password1"}));
        assert_eq!(WifiCredentials::from_payload(&object).unwrap().password, "password1");

        let list = Payload::Structured(json!(["net", "password1"]));
        assert_eq!(WifiCredentials::from_payload(&list).unwrap().ssid, "net");

        let bare = Payload::from("net");
        assert!(WifiCredentials::from_payload(&bare).unwrap().is_open());

        assert_eq!(
            WifiCredentials::from_payload(&Payload::Int(3)),
            Err(CredentialsError::InvalidFormat)
        );
        assert_eq!(
            WifiCredentials::from_payload(&Payload::Structured(json!([1, 2]))),
            Err(CredentialsError::InvalidFormat)
        );
    }
}
