//! Recon daemon
//!
//! Opens a BitFenix Recon fan controller, keeps its state current by polling,
//! and logs a JSON snapshot of every channel at a fixed interval.
//!
//! The controller is reached over USB HID unless `--transport serial` (or
//! `[device] transport`) says otherwise. The device path is taken from
//! `--device`, then `[device] path` in the config file, and is otherwise
//! located by USB VID/PID.

mod report;
mod shutdown;

use anyhow::{Context, Result};
use clap::Parser;
use recon_core::{
    default_config_path, BitfenixRecon, BoardConfig, BoardInfo, DeviceConfig, StaticConfig,
    TransportKind,
};
use recon_hardware::{
    find_controller, hid_driver, Device, FrameTransport, HidDriver, SerialDriver,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Environment variable overriding the default config path
const CONFIG_ENV: &str = "RECON_CONFIG";

/// Recon polling daemon
#[derive(Parser, Debug)]
#[command(name = "recond")]
#[command(version, about = "BitFenix Recon fan controller daemon", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device path (e.g., /dev/hidraw0 for hid, /dev/ttyUSB0 for serial)
    ///
    /// Takes precedence over `[device] path` in the config file.
    #[arg(short, long)]
    device: Option<String>,

    /// Transport (hid, serial)
    ///
    /// Takes precedence over `[device] transport` in the config file.
    #[arg(short, long)]
    transport: Option<TransportKind>,

    /// List attached controllers and exit
    #[arg(long)]
    list: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Drop inbound frames with a bad checksum
    #[arg(long)]
    verify_checksum: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose);

    info!("Recon daemon starting...");

    // CLI flag > env var > default
    let config_path = resolve_config_path(args.config, std::env::var(CONFIG_ENV).ok());
    info!("Configuration file: {}", config_path.display());

    let mut config = StaticConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    if args.verify_checksum {
        config.polling.verify_checksum = true;
    }

    if args.list {
        return list_controllers();
    }

    if let Some(transport) = args.transport {
        config.device.transport = transport;
    }
    if args.device.is_some() {
        config.device.path = args.device;
    }

    let transport = build_transport(&config.device, args.verbose)?;
    let device = Arc::new(Device::with_transport(
        transport,
        config.polling.clone(),
        BoardInfo::of::<BitfenixRecon>(),
    ));

    let signal_task = tokio::spawn(shutdown::stop_on_signal(device.clone()));
    let report_task = (config.report.interval_secs > 0).then(|| {
        tokio::spawn(report::run(
            device.clone(),
            Duration::from_secs(config.report.interval_secs),
        ))
    });

    let result = device.start().await;

    signal_task.abort();
    if let Some(task) = report_task {
        task.abort();
    }

    result.context("Device polling failed")?;
    info!("Recon daemon shutdown complete");
    Ok(())
}

/// Print the HID path of every attached controller
fn list_controllers() -> Result<()> {
    let paths = hid_driver::scan::<BitfenixRecon>().context("Failed to scan for controllers")?;
    if paths.is_empty() {
        println!("No {} found", BitfenixRecon::NAME);
    }
    for path in paths {
        println!("{}", path);
    }
    Ok(())
}

/// Build the configured transport for the Recon board
fn build_transport(device: &DeviceConfig, verbose: bool) -> Result<Box<dyn FrameTransport>> {
    let debug_uart = device.debug_uart || verbose;

    let transport: Box<dyn FrameTransport> = match device.transport {
        TransportKind::Hid => {
            info!(
                "Using {} over USB HID at {} (read timeout {}ms)",
                BitfenixRecon::NAME,
                device.path.as_deref().unwrap_or("VID/PID lookup"),
                device.read_timeout_ms
            );
            Box::new(HidDriver::<BitfenixRecon>::new(
                device.path.as_deref(),
                device.read_timeout_ms,
                debug_uart,
            ))
        }
        TransportKind::Serial => {
            let path = match &device.path {
                Some(path) => path.clone(),
                None => find_controller::<BitfenixRecon>()
                    .context("No serial port configured and no controller found")?,
            };
            info!(
                "Using {} over serial at {} (read timeout {}ms)",
                BitfenixRecon::NAME,
                path,
                device.read_timeout_ms
            );
            Box::new(SerialDriver::<BitfenixRecon>::new(
                &path,
                device.read_timeout_ms,
                debug_uart,
            ))
        }
    };
    Ok(transport)
}

/// Pick the config file: explicit flag, then environment, then default location
fn resolve_config_path(flag: Option<PathBuf>, env: Option<String>) -> PathBuf {
    flag.or_else(|| env.map(PathBuf::from))
        .unwrap_or_else(default_config_path)
}

/// Initialize tracing subscriber for logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
