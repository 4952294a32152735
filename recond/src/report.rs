//! Periodic snapshot reporting
//!
//! Logs the device snapshot as a single JSON line so it can be scraped from
//! the journal.

use recon_core::DeviceSnapshot;
use recon_hardware::{Device, FrameTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Log a snapshot every `period` while the device is initialized.
///
/// Never returns; the caller aborts the task on shutdown.
pub async fn run<T>(device: Arc<Device<T>>, period: Duration)
where
    T: FrameTransport + ?Sized + 'static,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if !device.is_initialized().await {
            debug!("Device not initialized, skipping snapshot");
            continue;
        }

        match snapshot_line(&device.snapshot().await) {
            Ok(line) => info!(target: "recond::snapshot", "{}", line),
            Err(e) => warn!("Failed to serialize snapshot: {}", e),
        }
    }
}

/// Render a snapshot as one JSON line
pub fn snapshot_line(snapshot: &DeviceSnapshot) -> anyhow::Result<String> {
    Ok(snapshot.to_json()?)
}
