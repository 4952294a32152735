//! Configuration types for the Recon driver
//!
//! [`StaticConfig`] holds device, polling and reporting settings. It is loaded
//! once at startup from a TOML file and is read-only afterwards.

mod paths;
mod static_config;

pub use paths::default_config_path;
pub use static_config::{
    DeviceConfig, PollingConfig, ReportConfig, StaticConfig, TransportKind,
};
