//! GPIO access: bank codec, pin table, hardware backends and the polling manager.

pub mod backend;
pub mod bank;
pub mod manager;
pub mod pin;

pub use backend::{open_hardware_backend, GpioBackend, SimulatedGpio};
#[cfg(feature = "gpio")]
pub use backend::RaspberryPiGpio;
pub use bank::{decode, encode, Bank, BankBits, BANK_WIDTH};
pub use manager::{GpioManager, GpioStatistics, PinStatus};
pub use pin::{Pin, PinMode, PinSpec, PIN_COUNT, PIN_MAP};
