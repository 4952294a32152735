//! Board definitions
//!
//! Trait-based description of the controller hardware. The `BoardConfig`
//! trait carries compile-time constants; `BoardInfo` is the runtime form that
//! the device state machine stores and validates channel indices against.
//!
//! Actual hardware I/O lives in the `recon-hardware` crate.

use serde::{Deserialize, Serialize};

use crate::{ReconError, Result};

/// Highest channel count the protocol can address (channel index is a nibble).
pub const MAX_ADDRESSABLE_CHANNELS: usize = 16;

/// Hardware board configuration trait
///
/// # Example
///
/// ```
/// use recon_core::board::{BitfenixRecon, BoardConfig};
///
/// const CHANNELS: usize = BitfenixRecon::CHANNEL_COUNT;
/// const NAME: &str = BitfenixRecon::NAME;
/// ```
pub trait BoardConfig: Send + Sync + 'static {
    /// Human-readable board name
    const NAME: &'static str;

    /// Number of fan/temperature channels
    const CHANNEL_COUNT: usize;

    /// USB Vendor ID for device detection
    const USB_VID: u16;

    /// USB Product ID for device detection
    const USB_PID: u16;

    /// Baud rate used when the controller is exposed as a serial port
    const BAUD_RATE: u32;

    /// Default read/write timeout in milliseconds
    const DEFAULT_TIMEOUT_MS: u64;
}

/// BitFenix Recon: five channels, each with a thermal probe and a fan header.
pub struct BitfenixRecon;

impl BoardConfig for BitfenixRecon {
    const NAME: &'static str = "BitFenix Recon";
    const CHANNEL_COUNT: usize = 5;
    const USB_VID: u16 = 0x0C45;
    const USB_PID: u16 = 0x7100;
    const BAUD_RATE: u32 = 115200;
    const DEFAULT_TIMEOUT_MS: u64 = 1000;
}

/// Default board type used throughout the codebase
pub type DefaultBoard = BitfenixRecon;

/// Runtime board information (non-generic)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardInfo {
    /// Human-readable board name
    pub name: String,
    /// Number of channels
    pub channel_count: usize,
    /// USB Vendor ID
    pub usb_vid: u16,
    /// USB Product ID
    pub usb_pid: u16,
}

impl BoardInfo {
    /// Build runtime info from a compile-time board definition
    pub fn of<B: BoardConfig>() -> Self {
        Self {
            name: B::NAME.to_string(),
            channel_count: B::CHANNEL_COUNT,
            usb_vid: B::USB_VID,
            usb_pid: B::USB_PID,
        }
    }

    /// Same identity as the default board, with a different channel count.
    ///
    /// # Errors
    ///
    /// Returns an error if the count is zero or cannot be addressed by the
    /// control byte's channel nibble.
    pub fn with_channel_count(channel_count: usize) -> Result<Self> {
        if channel_count == 0 || channel_count > MAX_ADDRESSABLE_CHANNELS {
            return Err(ReconError::InvalidInput(format!(
                "Channel count must be 1-{}, got {}",
                MAX_ADDRESSABLE_CHANNELS, channel_count
            )));
        }
        Ok(Self {
            channel_count,
            ..Self::of::<DefaultBoard>()
        })
    }

    /// Validate a channel index against this board's channel count
    ///
    /// ```
    /// use recon_core::board::{BitfenixRecon, BoardInfo};
    ///
    /// let board = BoardInfo::of::<BitfenixRecon>();
    /// assert!(board.validate_channel(0).is_ok());
    /// assert!(board.validate_channel(4).is_ok());
    /// assert!(board.validate_channel(5).is_err());
    /// ```
    pub fn validate_channel(&self, channel: usize) -> Result<()> {
        if channel >= self.channel_count {
            return Err(ReconError::InvalidChannel {
                channel,
                channel_count: self.channel_count,
            });
        }
        Ok(())
    }
}

impl Default for BoardInfo {
    fn default() -> Self {
        Self::of::<DefaultBoard>()
    }
}
