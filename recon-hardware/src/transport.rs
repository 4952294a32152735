//! Frame transport abstraction
//!
//! The device state machine only needs a duplex stream of fixed-size
//! frames with an explicit open/close lifecycle. Enumerating and opening the
//! physical device is the implementor's business.

use async_trait::async_trait;
use recon_core::Result;

use crate::frame::FRAME_SIZE;

/// Duplex 8-byte frame stream
///
/// This trait enables testing of `Device` without real hardware
/// by allowing mock implementations.
#[async_trait]
pub trait FrameTransport: Send {
    /// Open the underlying device; called once by `Device::start`
    async fn open(&mut self) -> Result<()>;

    /// Close the underlying device; called once when polling stops
    async fn close(&mut self) -> Result<()>;

    /// Read one frame, bounded by the transport's own timeout.
    ///
    /// Returns the number of bytes read.
    async fn read_frame(&mut self, buf: &mut [u8; FRAME_SIZE]) -> Result<usize>;

    /// Write one frame
    async fn write_frame(&mut self, frame: &[u8; FRAME_SIZE]) -> Result<()>;
}
