use crate::codec::DEFAULT_MAX_FRAME_SIZE;
use crate::transport::{format_multiaddr, parse_multiaddr};
use libp2p::Multiaddr;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// The control socket `p2pd` listens on unless told otherwise.
pub const DEFAULT_DAEMON_SOCKET: &str = "/unix/tmp/p2pd.sock";

/// Where to find the daemon and how large a frame we are prepared to accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    #[serde(with = "multiaddr_text")]
    pub daemon_addr: Multiaddr,
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { daemon_addr: default_daemon_addr(), max_frame_size: DEFAULT_MAX_FRAME_SIZE }
    }
}

impl ClientConfig {
    pub fn new(daemon_addr: Multiaddr) -> Self {
        Self { daemon_addr, ..Default::default() }
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let text = self.to_yml()?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn to_yml(&self) -> Result<String, ConfigError> {
        let s = serde_yml::to_string(self)?;
        Ok(s)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yml(&text)
    }

    pub fn from_yml(text: &str) -> Result<Self, ConfigError> {
        let config = serde_yml::from_str(text)?;
        Ok(config)
    }
}

fn default_daemon_addr() -> Multiaddr {
    // Infallible for the constant above.
    parse_multiaddr(DEFAULT_DAEMON_SOCKET).unwrap_or_else(|_| Multiaddr::empty())
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read or write the configuration file. {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration. {0}")]
    Serde(#[from] serde_yml::Error),
}

/// Multiaddrs are stored in their text form, with unix socket paths kept intact.
mod multiaddr_text {
    use super::*;
    use serde::{de, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(addr: &Multiaddr, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_multiaddr(addr))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Multiaddr, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_multiaddr(&s).map_err(de::Error::custom)
    }
}
