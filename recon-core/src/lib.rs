//! Recon Core Library
//!
//! Shared types, board definition and configuration for the Recon fan
//! controller driver. Used by the hardware crate and the daemon.

pub mod board;
pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use board::*;
pub use config::{
    default_config_path, DeviceConfig, PollingConfig, ReportConfig, StaticConfig,
    TransportKind,
};
pub use error::*;
pub use types::*;
