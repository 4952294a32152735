//! Error types for the Recon driver

use thiserror::Error;

/// Core error type for Recon operations
#[derive(Error, Debug)]
pub enum ReconError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(String),

    /// USB HID errors
    #[error("USB HID error: {0}")]
    Hid(String),

    /// Invalid input or arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Channel index out of range
    #[error("Channel out of range: {channel} (must be 0-{max})", max = channel_count.saturating_sub(1))]
    InvalidChannel { channel: usize, channel_count: usize },

    /// Inbound frame could not be decoded
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Inbound frame checksum does not match its contents
    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// Device polling is already running
    #[error("Device polling is already started")]
    AlreadyStarted,

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Device not found
    #[error("Device not found")]
    DeviceNotFound,

    /// Device disconnected (USB unplugged, power cycle)
    #[error("Device disconnected: {0}")]
    DeviceDisconnected(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

}

/// Result type alias for Recon operations
pub type Result<T> = std::result::Result<T, ReconError>;

impl From<serde_json::Error> for ReconError {
    fn from(err: serde_json::Error) -> Self {
        ReconError::Serialization(err.to_string())
    }
}
