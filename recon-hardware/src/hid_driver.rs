//! USB HID driver
//!
//! The Recon enumerates as a HID device and exchanges one 8-byte report per
//! frame. `hidapi` calls are blocking, so every device call runs on the
//! blocking pool.

use async_trait::async_trait;
use hidapi::{HidApi, HidDevice};
use recon_core::{BoardConfig, ReconError, Result};
use std::ffi::CString;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

use crate::frame::FRAME_SIZE;
use crate::transport::FrameTransport;

/// Report ID prefixed to output reports of devices without numbered reports
const REPORT_ID: u8 = 0x00;

/// HID driver for hardware communication
pub struct HidDriver<B: BoardConfig = recon_core::DefaultBoard> {
    device: Option<Arc<Mutex<HidDevice>>>,
    path: Option<String>,
    timeout_ms: i32,
    debug_uart: bool,
    _board: PhantomData<B>,
}

impl<B: BoardConfig> HidDriver<B> {
    /// Create a new HID driver. The device is opened by [`FrameTransport::open`].
    ///
    /// # Arguments
    /// * `path` - hidraw path (e.g., "/dev/hidraw0"); located by VID/PID when `None`
    /// * `timeout_ms` - Timeout in milliseconds for each report read
    /// * `debug_uart` - Log every report sent and received
    pub fn new(path: Option<&str>, timeout_ms: u64, debug_uart: bool) -> Self {
        Self {
            device: None,
            path: path.map(str::to_string),
            timeout_ms: i32::try_from(timeout_ms).unwrap_or(i32::MAX),
            debug_uart,
            _board: PhantomData,
        }
    }

    /// Explicit device path, if one was given
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Whether the device is currently open
    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Run a blocking call against the open device
    async fn with_device<F, R>(&self, op: F) -> Result<R>
    where
        F: FnOnce(&HidDevice) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let device = self.device.clone().ok_or_else(|| {
            ReconError::DeviceDisconnected(format!("{} is not open", B::NAME))
        })?;

        tokio::task::spawn_blocking(move || {
            let device = device
                .lock()
                .map_err(|_| ReconError::Hid("Device lock poisoned".to_string()))?;
            op(&device)
        })
        .await
        .map_err(|e| ReconError::Hid(format!("HID task failed: {}", e)))?
    }
}

#[async_trait]
impl<B: BoardConfig> FrameTransport for HidDriver<B> {
    async fn open(&mut self) -> Result<()> {
        let path = self.path.clone();
        let device = tokio::task::spawn_blocking(move || open_device::<B>(path.as_deref()))
            .await
            .map_err(|e| ReconError::Hid(format!("HID task failed: {}", e)))??;

        debug!("HID device opened successfully");
        self.device = Some(Arc::new(Mutex::new(device)));
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.device.take().is_some() {
            debug!("Closed {}", B::NAME);
        }
        Ok(())
    }

    async fn read_frame(&mut self, buf: &mut [u8; FRAME_SIZE]) -> Result<usize> {
        let timeout_ms = self.timeout_ms;
        let (n, report) = self
            .with_device(move |device| {
                let mut report = [0u8; FRAME_SIZE];
                let n = device
                    .read_timeout(&mut report, timeout_ms)
                    .map_err(|e| ReconError::Hid(format!("Read error: {}", e)))?;
                Ok((n, report))
            })
            .await?;

        if n == 0 {
            return Err(ReconError::Timeout("Read operation timed out".to_string()));
        }
        if self.debug_uart {
            debug!("RX: {:02X?}", &report[..n]);
        }
        *buf = report;
        Ok(n)
    }

    async fn write_frame(&mut self, frame: &[u8; FRAME_SIZE]) -> Result<()> {
        if self.debug_uart {
            debug!("TX: {:02X?}", frame);
        }
        let report = output_report(frame);

        let written = self
            .with_device(move |device| {
                device
                    .write(&report)
                    .map_err(|e| ReconError::Hid(format!("Write failed: {}", e)))
            })
            .await?;

        if written == 0 {
            return Err(ReconError::Hid("Write accepted no bytes".to_string()));
        }
        Ok(())
    }
}

/// Output report for one frame: report ID followed by the frame bytes
fn output_report(frame: &[u8; FRAME_SIZE]) -> [u8; FRAME_SIZE + 1] {
    let mut report = [REPORT_ID; FRAME_SIZE + 1];
    report[1..].copy_from_slice(frame);
    report
}

fn open_device<B: BoardConfig>(path: Option<&str>) -> Result<HidDevice> {
    let api = HidApi::new()
        .map_err(|e| ReconError::Hid(format!("Failed to initialize HID API: {}", e)))?;

    match path {
        Some(path) => {
            debug!("Opening HID device: {}", path);
            let c_path = CString::new(path)
                .map_err(|_| ReconError::InvalidInput(format!("Invalid device path: {}", path)))?;
            api.open_path(&c_path).map_err(|e| {
                error!("Failed to open {}: {}", path, e);
                ReconError::Hid(format!("Failed to open {}: {}", path, e))
            })
        }
        None => {
            let info = api
                .device_list()
                .find(|d| d.vendor_id() == B::USB_VID && d.product_id() == B::USB_PID)
                .ok_or_else(|| {
                    error!("{} not found", B::NAME);
                    ReconError::DeviceNotFound
                })?;
            debug!("Opening {} at {}", B::NAME, info.path().to_string_lossy());
            info.open_device(&api).map_err(|e| {
                error!("Failed to open {}: {}", B::NAME, e);
                ReconError::Hid(format!("Failed to open {}: {}", B::NAME, e))
            })
        }
    }
}

/// List the HID paths of every attached controller matching the board's VID/PID
pub fn scan<B: BoardConfig>() -> Result<Vec<String>> {
    debug!(
        "Searching for {} (VID:0x{:04X}, PID:0x{:04X})",
        B::NAME,
        B::USB_VID,
        B::USB_PID
    );

    let api = HidApi::new()
        .map_err(|e| ReconError::Hid(format!("Failed to initialize HID API: {}", e)))?;

    Ok(api
        .device_list()
        .filter(|d| d.vendor_id() == B::USB_VID && d.product_id() == B::USB_PID)
        .map(|d| d.path().to_string_lossy().into_owned())
        .collect())
}
