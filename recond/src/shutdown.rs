//! Shutdown handling for graceful daemon termination
//!
//! Waits for Ctrl+C or SIGTERM and stops the device, which makes
//! `Device::start` return once both workers have exited.

use recon_hardware::{Device, FrameTransport};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

/// Stop the device once a shutdown signal arrives
pub async fn stop_on_signal<T>(device: Arc<Device<T>>)
where
    T: FrameTransport + ?Sized + 'static,
{
    shutdown_signal().await;
    device.stop().await;
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}
