//! Static configuration loaded once at startup
//!
//! This configuration is read-only after the daemon starts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::{BoardConfig, DefaultBoard, ReconError, Result};

/// How the controller is reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// USB HID reports (the stock controller)
    #[default]
    Hid,
    /// Byte stream over a serial port
    Serial,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Hid => write!(f, "hid"),
            TransportKind::Serial => write!(f, "serial"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = ReconError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "hid" => Ok(TransportKind::Hid),
            "serial" => Ok(TransportKind::Serial),
            _ => Err(ReconError::InvalidInput(format!(
                "Unknown transport: '{}'. Valid options: hid, serial",
                s
            ))),
        }
    }
}

/// Device connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Transport used to reach the controller
    pub transport: TransportKind,
    /// Device path (hidraw node or serial port); located by USB VID/PID when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Per-read/write timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Log every frame sent and received
    pub debug_uart: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Hid,
            path: None,
            read_timeout_ms: DefaultBoard::DEFAULT_TIMEOUT_MS,
            debug_uart: false,
        }
    }
}

/// Polling and reconciliation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// How long `start` waits for every channel to report
    pub init_timeout_secs: u64,
    /// Interval between temperature/speed polls
    pub speed_interval_secs: u64,
    /// Interval between status and alarm/manual polls
    pub status_interval_secs: u64,
    /// Outbound command queue capacity
    pub queue_capacity: usize,
    /// Drop inbound frames whose checksum does not match
    pub verify_checksum: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            init_timeout_secs: 16,
            speed_interval_secs: 5,
            status_interval_secs: 10,
            queue_capacity: 20,
            verify_checksum: false,
        }
    }
}

impl PollingConfig {
    /// Initialization window as a `Duration`
    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_secs)
    }

    /// Temperature/speed poll interval as a `Duration`
    pub fn speed_interval(&self) -> Duration {
        Duration::from_secs(self.speed_interval_secs)
    }

    /// Status poll interval as a `Duration`
    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }

    /// Reject values the polling loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.speed_interval_secs == 0 || self.status_interval_secs == 0 {
            return Err(ReconError::Config(
                "Polling intervals must be at least 1 second".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ReconError::Config(
                "Queue capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Snapshot reporting configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Interval between snapshot log lines; 0 disables reporting
    pub interval_secs: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { interval_secs: 10 }
    }
}

/// Static configuration for the Recon daemon.
///
/// Located at `~/.config/recon/config.toml` by default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticConfig {
    /// Device connection settings
    pub device: DeviceConfig,

    /// Polling settings
    pub polling: PollingConfig,

    /// Snapshot reporting settings
    pub report: ReportConfig,
}

impl StaticConfig {
    /// Load from a TOML file, falling back to defaults if the file is missing.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ReconError::Config(format!("Failed to read config file: {}", e)))?;
        let config = Self::from_toml(&content)
            .map_err(|e| ReconError::Config(format!("Failed to parse config file: {}", e)))?;
        config.polling.validate()?;
        Ok(config)
    }

    /// Parse StaticConfig from TOML string.
    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize StaticConfig to TOML string.
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
