//! Service configuration loaded from a JSON file.
//!
//! Every key is optional; anything missing falls back to the defaults below.
//!
//! ```json
//! {
//!   "listenPort": 5001,
//!   "errorRetentionMins": 60,
//!   "interfaceNames": ["eth0"],
//!   "gpio": { "pollingIntervalMs": 15, "stickyHighInputMs": 250 }
//! }
//! ```

use crate::error::{Result, ServiceError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings consumed by the GPIO core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GpioConfig {
    /// Sleep between poll cycles
    pub polling_interval_ms: u64,
    /// How long an input keeps reading high after its leading edge
    pub sticky_high_input_ms: u64,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            polling_interval_ms: crate::DEFAULT_POLLING_INTERVAL_MS,
            sticky_high_input_ms: crate::DEFAULT_STICKY_HIGH_INPUT_MS,
        }
    }
}

impl GpioConfig {
    /// Set the polling interval in milliseconds.
    pub fn with_polling_interval_ms(mut self, ms: u64) -> Self {
        self.polling_interval_ms = ms;
        self
    }

    /// Set the sticky-high hold in milliseconds.
    pub fn with_sticky_high_input_ms(mut self, ms: u64) -> Self {
        self.sticky_high_input_ms = ms;
        self
    }

    /// Delay between poll cycles.
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    /// How long a rising input edge is held high.
    pub fn sticky_high(&self) -> Duration {
        Duration::from_millis(self.sticky_high_input_ms)
    }
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceConfig {
    /// HTTP listen port
    pub listen_port: u16,
    /// UDP port the heartbeat is broadcast to
    pub heartbeat_port: u16,
    /// How long reported errors are remembered
    pub error_retention_mins: u64,
    /// Network interfaces considered for the heartbeat, in priority order
    pub interface_names: Vec<String>,
    /// File holding settings changed at runtime (device name)
    pub storage_path: PathBuf,
    /// Directory for the daily log files, `null` to log to the console only
    pub log_directory: Option<PathBuf>,
    pub gpio: GpioConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_port: crate::DEFAULT_WEB_PORT,
            heartbeat_port: crate::DEFAULT_HEARTBEAT_PORT,
            error_retention_mins: 60,
            interface_names: vec!["eth0".to_string(), "wlan0".to_string()],
            storage_path: PathBuf::from("ConfigStorage.json"),
            log_directory: Some(PathBuf::from("logs")),
            gpio: GpioConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from `path`. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => Self::from_json(&text).map_err(|e| {
                ServiceError::config_error(format!("{}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(
                    "Configuration file {} not found, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Parse configuration from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| ServiceError::config_error(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.gpio.polling_interval_ms == 0 {
            return Err(ServiceError::config_error(
                "gpio.pollingIntervalMs must be greater than zero",
            ));
        }
        Ok(())
    }

    /// How long reported errors stay in the error cache.
    pub fn error_retention(&self) -> Duration {
        Duration::from_secs(self.error_retention_mins.saturating_mul(60))
    }
}
