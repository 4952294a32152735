//! Core types and data structures for the Recon driver

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ReconError;

/// Temperature unit used by setters and the controller display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemperatureUnit {
    /// Degrees Celsius
    #[serde(rename = "C")]
    Celsius,
    /// Degrees Fahrenheit (the controller's native unit)
    #[serde(rename = "F")]
    Fahrenheit,
}

impl TemperatureUnit {
    /// Convert a value in this unit to Fahrenheit
    pub fn to_fahrenheit(self, value: i32) -> i32 {
        match self {
            TemperatureUnit::Celsius => celsius_to_fahrenheit(value),
            TemperatureUnit::Fahrenheit => value,
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemperatureUnit::Celsius => write!(f, "C"),
            TemperatureUnit::Fahrenheit => write!(f, "F"),
        }
    }
}

impl FromStr for TemperatureUnit {
    type Err = ReconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "c" | "celsius" => Ok(TemperatureUnit::Celsius),
            "f" | "fahrenheit" => Ok(TemperatureUnit::Fahrenheit),
            _ => Err(ReconError::InvalidInput(format!(
                "Unknown temperature unit: '{}'. Valid options: C, F",
                s
            ))),
        }
    }
}

/// Fahrenheit to Celsius, truncated toward zero.
///
/// ```
/// use recon_core::fahrenheit_to_celsius;
///
/// assert_eq!(fahrenheit_to_celsius(212), 100);
/// assert_eq!(fahrenheit_to_celsius(0), -17);
/// ```
pub fn fahrenheit_to_celsius(f: i32) -> i32 {
    (f - 32) * 5 / 9
}

/// Celsius to Fahrenheit, truncated toward zero.
///
/// `c * 9 / 5 + 32` evaluated exactly, then truncated once.
pub fn celsius_to_fahrenheit(c: i32) -> i32 {
    (c * 9 + 160) / 5
}

/// Device-wide mode flags
///
/// Packed into a single byte only on the wire (see [`DeviceSettings::to_bits`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Fans follow the manual speed instead of the controller's automatic curve
    pub manual: bool,
    /// Controller display shows Fahrenheit
    pub fahrenheit: bool,
    /// Audible alarm enabled
    pub audio: bool,
}

impl DeviceSettings {
    const MANUAL: u8 = 0x01;
    const FAHRENHEIT: u8 = 0x02;
    const AUDIO: u8 = 0x04;

    /// Unpack the wire bitmask; unknown bits are ignored
    pub fn from_bits(bits: u8) -> Self {
        Self {
            manual: bits & Self::MANUAL != 0,
            fahrenheit: bits & Self::FAHRENHEIT != 0,
            audio: bits & Self::AUDIO != 0,
        }
    }

    /// Pack into the wire bitmask
    pub fn to_bits(self) -> u8 {
        let mut bits = 0;
        if self.manual {
            bits |= Self::MANUAL;
        }
        if self.fahrenheit {
            bits |= Self::FAHRENHEIT;
        }
        if self.audio {
            bits |= Self::AUDIO;
        }
        bits
    }

    /// Unit shown on the controller display
    pub fn temperature_unit(self) -> TemperatureUnit {
        if self.fahrenheit {
            TemperatureUnit::Fahrenheit
        } else {
            TemperatureUnit::Celsius
        }
    }
}

/// Device lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePhase {
    /// Not polling
    Stopped,
    /// Waiting for the first reports from every channel
    Initializing,
    /// Polling and reconciling
    Running,
}

/// Point-in-time view of one channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    /// Channel index
    pub index: usize,
    /// Current probe temperature in Celsius
    pub temperature_c: i32,
    /// Current probe temperature in Fahrenheit
    pub temperature_f: i32,
    /// Current fan speed (RPM)
    pub speed: u16,
    /// Maximum fan speed reported by the controller (RPM)
    pub max_speed: u16,
    /// Manual speed as set on the controller (RPM)
    pub manual_speed: u16,
    /// Operator target speed, if one is known
    pub target_speed: Option<u16>,
    /// Alarm temperature in Celsius
    pub alarm_temperature_c: i32,
    /// Alarm temperature in Fahrenheit
    pub alarm_temperature_f: i32,
    /// Operator target alarm temperature in Fahrenheit, if one is known
    pub target_alarm_temperature_f: Option<u8>,
    /// Both report kinds have been received
    pub initialized: bool,
}

/// Point-in-time view of a whole device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    /// Lifecycle phase
    pub phase: DevicePhase,
    /// Every channel has been initialized
    pub initialized: bool,
    /// Audible alarm enabled
    pub audio: bool,
    /// Manual fan mode
    pub manual: bool,
    /// Unit used by the controller display
    pub temp_mode: TemperatureUnit,
    /// Channel currently shown on the controller display
    pub display_channel: u8,
    /// Per-channel state
    pub channels: Vec<ChannelSnapshot>,
}

impl DeviceSnapshot {
    /// Render as a JSON string
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
