use crate::wire::DEFAULT_PORT;
use serde_derive::{Deserialize, Serialize};

#[cfg(target_os = "linux")]
pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";
#[cfg(target_os = "windows")]
pub const DEFAULT_SERIAL_PORT: &str = "COM3";
#[cfg(not(any(target_os = "linux", target_os = "windows")))]
pub const DEFAULT_SERIAL_PORT: &str = "/dev/cu.PL2303-00001014";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub port: u16,
    pub bind_address: String,
    /// `None` sends to the subnet broadcast address, otherwise `host` or
    /// `host:port`
    pub destination: Option<String>,
    /// Only accept packets from this address when non-empty
    pub peer_filter: String,
}

impl Default for Network {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: "0.0.0.0".to_string(),
            destination: None,
            peer_filter: String::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hardware {
    pub enabled: bool,
    /// `None` scans for a Prolific USB adapter
    pub port: Option<String>,
    pub baud_rate: u32,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            enabled: true,
            port: None,
            baud_rate: 19_200,
        }
    }
}

/// Operator modes in effect at startup
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modes {
    pub auto: bool,
    pub send: bool,
}

impl Default for Modes {
    fn default() -> Self {
        Self {
            auto: true,
            send: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub network: Network,
    pub hardware: Hardware,
    pub modes: Modes,
}
