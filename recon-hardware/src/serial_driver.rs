//! Serial driver for low-level hardware communication
//!
//! Exposes the controller as a [`FrameTransport`] over a tokio-serial port,
//! for Recons reached through a USB-serial bridge. The stock controller is a
//! HID device; see [`crate::hid_driver`].

use async_trait::async_trait;
use recon_core::{BoardConfig, ReconError, Result};
use std::marker::PhantomData;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, timeout_at, Instant};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, warn};

use crate::frame::FRAME_SIZE;
use crate::transport::FrameTransport;

/// Bytes of one frame collected across reads
///
/// A byte stream has no frame boundaries, so bytes that arrived before a
/// read timed out are kept for the next call instead of being discarded.
#[derive(Debug, Default)]
struct FrameAssembler {
    buf: [u8; FRAME_SIZE],
    len: usize,
}

impl FrameAssembler {
    /// Read until a whole frame is buffered or `limit` elapses.
    async fn fill<R>(&mut self, reader: &mut R, limit: Duration) -> Result<[u8; FRAME_SIZE]>
    where
        R: AsyncRead + Unpin,
    {
        let deadline = Instant::now() + limit;
        while self.len < FRAME_SIZE {
            match timeout_at(deadline, reader.read(&mut self.buf[self.len..])).await {
                Ok(Ok(0)) => {
                    self.len = 0;
                    warn!("Serial port returned EOF - device may have been disconnected");
                    return Err(ReconError::DeviceDisconnected(
                        "Serial port returned EOF - device may have been unplugged".to_string(),
                    ));
                }
                Ok(Ok(n)) => self.len += n,
                Ok(Err(e)) => return Err(ReconError::Serial(format!("Read error: {}", e))),
                Err(_) => {
                    return Err(ReconError::Timeout(format!(
                        "Read operation timed out ({} of {} bytes buffered)",
                        self.len, FRAME_SIZE
                    )))
                }
            }
        }
        self.len = 0;
        Ok(self.buf)
    }
}

/// Serial driver for hardware communication
pub struct SerialDriver<B: BoardConfig = recon_core::DefaultBoard> {
    port: Option<SerialStream>,
    rx: FrameAssembler,
    port_path: String,
    timeout_duration: Duration,
    debug_uart: bool,
    _board: PhantomData<B>,
}

impl<B: BoardConfig> SerialDriver<B> {
    /// Create a new serial driver. The port is opened by [`FrameTransport::open`].
    ///
    /// # Arguments
    /// * `port_path` - Path to the serial device (e.g., "/dev/ttyUSB0")
    /// * `timeout_ms` - Timeout in milliseconds for read/write operations
    /// * `debug_uart` - Enable UART debug logging
    pub fn new(port_path: &str, timeout_ms: u64, debug_uart: bool) -> Self {
        if debug_uart {
            debug!("UART debug logging enabled");
        }

        Self {
            port: None,
            rx: FrameAssembler::default(),
            port_path: port_path.to_string(),
            timeout_duration: Duration::from_millis(timeout_ms),
            debug_uart,
            _board: PhantomData,
        }
    }

    /// Path of the serial device
    pub fn port_path(&self) -> &str {
        &self.port_path
    }

    /// Whether the port is currently open
    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn port_mut(&mut self) -> Result<&mut SerialStream> {
        self.port.as_mut().ok_or_else(|| {
            ReconError::DeviceDisconnected(format!("Serial port {} is not open", self.port_path))
        })
    }
}

#[async_trait]
impl<B: BoardConfig> FrameTransport for SerialDriver<B> {
    async fn open(&mut self) -> Result<()> {
        debug!("Opening serial port: {}", self.port_path);

        let port = tokio_serial::new(&self.port_path, B::BAUD_RATE)
            .timeout(self.timeout_duration)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                error!("Failed to open serial port {}: {}", self.port_path, e);
                ReconError::Serial(format!("Failed to open serial port: {}", e))
            })?;

        debug!("Serial port opened successfully");
        self.port = Some(port);
        self.rx = FrameAssembler::default();
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            debug!("Closed serial port: {}", self.port_path);
        }
        Ok(())
    }

    async fn read_frame(&mut self, buf: &mut [u8; FRAME_SIZE]) -> Result<usize> {
        let port = self.port.as_mut().ok_or_else(|| {
            ReconError::DeviceDisconnected(format!("Serial port {} is not open", self.port_path))
        })?;

        *buf = self.rx.fill(port, self.timeout_duration).await?;
        if self.debug_uart {
            debug!("RX: {:02X?}", buf);
        }
        Ok(FRAME_SIZE)
    }

    async fn write_frame(&mut self, frame: &[u8; FRAME_SIZE]) -> Result<()> {
        let timeout_duration = self.timeout_duration;
        if self.debug_uart {
            debug!("TX: {:02X?}", frame);
        }
        let port = self.port_mut()?;

        timeout(timeout_duration, port.write_all(frame))
            .await
            .map_err(|_| ReconError::Timeout("Write operation timed out".to_string()))?
            .map_err(|e| ReconError::Serial(format!("Write failed: {}", e)))?;

        timeout(timeout_duration, port.flush())
            .await
            .map_err(|_| ReconError::Timeout("Flush operation timed out".to_string()))?
            .map_err(|e| ReconError::Serial(format!("Flush failed: {}", e)))?;

        Ok(())
    }
}

/// Find the controller's serial port by VID/PID
pub fn find_controller<B: BoardConfig>() -> Result<String> {
    debug!(
        "Searching for {} (VID:0x{:04X}, PID:0x{:04X})",
        B::NAME,
        B::USB_VID,
        B::USB_PID
    );

    let ports = tokio_serial::available_ports().map_err(|e| {
        error!("Failed to enumerate serial ports: {}", e);
        ReconError::Serial(format!("Failed to enumerate ports: {}", e))
    })?;

    for port in ports {
        debug!("Checking port: {}", port.port_name);

        if let tokio_serial::SerialPortType::UsbPort(info) = &port.port_type {
            debug!("  USB Device - VID:{:04X} PID:{:04X}", info.vid, info.pid);

            if info.vid == B::USB_VID && info.pid == B::USB_PID {
                debug!("Found {} at: {}", B::NAME, port.port_name);
                return Ok(port.port_name);
            }
        }
    }

    error!("{} not found", B::NAME);
    Err(ReconError::DeviceNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::BitfenixRecon;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_find_controller() {
        // Fails without hardware attached; only check it runs
        let _ = find_controller::<BitfenixRecon>();
    }

    #[test]
    fn test_new_does_not_open() {
        let driver = SerialDriver::<BitfenixRecon>::new("/dev/does-not-exist", 250, false);
        assert!(!driver.is_open());
        assert_eq!(driver.port_path(), "/dev/does-not-exist");
    }

    #[tokio::test]
    async fn test_io_before_open_fails() {
        let mut driver = SerialDriver::<BitfenixRecon>::new("/dev/does-not-exist", 250, false);
        let mut buf = [0u8; FRAME_SIZE];

        assert!(matches!(
            driver.read_frame(&mut buf).await,
            Err(ReconError::DeviceDisconnected(_))
        ));
        assert!(matches!(
            driver.write_frame(&buf).await,
            Err(ReconError::DeviceDisconnected(_))
        ));
    }

    #[tokio::test]
    async fn test_open_missing_port_fails() {
        let mut driver = SerialDriver::<BitfenixRecon>::new("/dev/does-not-exist", 250, false);
        assert!(matches!(
            driver.open().await,
            Err(ReconError::Serial(_))
        ));
        assert!(driver.close().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_frame_survives_timeout() {
        let (mut tx, mut rx) = tokio::io::duplex(64);
        let mut assembler = FrameAssembler::default();
        let limit = Duration::from_millis(250);

        tx.write_all(&[0x02, 0x31, 0xCD]).await.unwrap();
        assert!(matches!(
            assembler.fill(&mut rx, limit).await,
            Err(ReconError::Timeout(_))
        ));

        tx.write_all(&[0x00; 5]).await.unwrap();
        assert_eq!(
            assembler.fill(&mut rx, limit).await.unwrap(),
            [0x02, 0x31, 0xCD, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_frames_stay_aligned() {
        let (mut tx, mut rx) = tokio::io::duplex(64);
        let mut assembler = FrameAssembler::default();
        let limit = Duration::from_millis(250);

        let first = [0x02, 0x90, 0x6E, 0, 0, 0, 0, 0];
        let second = [0x02, 0x50, 0xAE, 0, 0, 0, 0, 0];
        tx.write_all(&first).await.unwrap();
        tx.write_all(&second[..4]).await.unwrap();

        assert_eq!(assembler.fill(&mut rx, limit).await.unwrap(), first);
        assert!(assembler.fill(&mut rx, limit).await.is_err());

        tx.write_all(&second[4..]).await.unwrap();
        assert_eq!(assembler.fill(&mut rx, limit).await.unwrap(), second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_stream_is_disconnect() {
        let (tx, mut rx) = tokio::io::duplex(64);
        let mut assembler = FrameAssembler::default();
        drop(tx);

        assert!(matches!(
            assembler.fill(&mut rx, Duration::from_millis(250)).await,
            Err(ReconError::DeviceDisconnected(_))
        ));
    }
}
