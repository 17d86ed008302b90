//! Bridge configuration.
//!
//! Read from a YAML file; every field is optional. Command-line flags
//! override file values.
//!
//! ```yaml
//! board: Arietta_G25
//! remote_address: 192.168.10.20
//! retry_limit: 30
//! inputs: [J4.7, PA22]
//! inverted: [J4.13]
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_BOARD: &str = "Arietta_G25";
pub const DEFAULT_REMOTE_ADDRESS: &str = "192.168.10.20";
pub const DEFAULT_RETRY_LIMIT: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Board name, e.g. `Arietta_G25`.
    pub board: String,

    /// Remote console address, `host` or `host:port`.
    pub remote_address: String,

    /// Failed connect attempts allowed over the whole run; 0 retries
    /// forever.
    pub retry_limit: u32,

    /// Start counting failures again after each successful connect.
    pub reset_retries_on_connect: bool,

    pub poll_interval_ms: u64,
    pub settle_ms: u64,
    pub connect_delay_ms: u64,
    pub cooldown_ms: u64,
    pub connect_timeout_ms: u64,

    /// Pins put in input mode on every connect.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,

    /// Pins whose writes are inverted on every connect.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inverted: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            board: DEFAULT_BOARD.to_string(),
            remote_address: DEFAULT_REMOTE_ADDRESS.to_string(),
            retry_limit: DEFAULT_RETRY_LIMIT,
            reset_retries_on_connect: false,
            poll_interval_ms: 100,
            settle_ms: 50,
            connect_delay_ms: 3000,
            cooldown_ms: 1000,
            connect_timeout_ms: 5000,
            inputs: Vec::new(),
            inverted: Vec::new(),
        }
    }
}

impl Config {
    /// Parses a YAML document.
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Loads a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&text)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Checks values that would stall the bridge.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be positive".to_string()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(Error::Config("connect_timeout_ms must be positive".to_string()));
        }
        if self.remote_address.trim().is_empty() {
            return Err(Error::Config("remote_address is empty".to_string()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn connect_delay(&self) -> Duration {
        Duration::from_millis(self.connect_delay_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
