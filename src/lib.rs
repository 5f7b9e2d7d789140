//! # pi_gpiod - GPIO status daemon for Raspberry Pi
//!
//! Continuously polls 32 GPIO lines arranged as three 8-bit banks (two input
//! banks, one output bank) and exposes them over a small HTTP command API,
//! with a UDP heartbeat for discovery.
//!
//! ## Features
//!
//! - **Polling thread**: fixed-interval sampling with sticky-high debounce on inputs
//! - **Consistent snapshots**: bank reads never mix two poll cycles
//! - **Self-healing**: a health monitor restarts the poller if it dies
//! - **Daily log files**: served back over HTTP by `/statistics/getlogs`
//! - **Hardware optional**: rppal backend behind the `gpio` feature, in-memory
//!   simulation everywhere else
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pi_gpiod::{Bank, ErrorHandler, GpioConfig, GpioManager, SimulatedGpio};
//!
//! let gpio = GpioManager::new(
//!     GpioConfig::default(),
//!     Some(Box::new(SimulatedGpio::new())),
//!     ErrorHandler::default(),
//! );
//! gpio.initialize();
//! gpio.set_bank(Bank::Output, "00001111").unwrap();
//! println!("input1 = {}", gpio.bank(Bank::Input1));
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod gpio;
pub mod health;
pub mod logs;
pub mod stats;
pub mod web;

// Re-export public API
pub use config::{GpioConfig, ServiceConfig};
pub use device::{DeviceInfo, ServiceState, ServiceStatus};
pub use error::{Result, ServiceError};
pub use gpio::{
    Bank, GpioBackend, GpioManager, GpioStatistics, PinMode, SimulatedGpio,
};
pub use health::{ErrorCache, ErrorHandler, HealthMonitor, Heartbeat};
pub use logs::{LogFiles, LogQuery};
pub use stats::{CpsCalculator, ServiceStats};
pub use web::{create_app, start_web_server, AppState, WebConfig};

/// Name reported in responses and logs
pub const SERVICE_NAME: &str = "pi_gpiod";

/// Default delay between poll cycles in milliseconds
pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 15;

/// Default sticky-high hold for inputs in milliseconds
pub const DEFAULT_STICKY_HIGH_INPUT_MS: u64 = 250;

/// The default HTTP port
pub const DEFAULT_WEB_PORT: u16 = 5001;

/// The default UDP heartbeat port
pub const DEFAULT_HEARTBEAT_PORT: u16 = 5002;
