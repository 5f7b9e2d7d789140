//! Hardware access for the GPIO manager.
//!
//! The manager only talks to [`GpioBackend`]. The real implementation uses
//! rppal and is feature-gated so the daemon still compiles on machines without
//! a Raspberry Pi; [`SimulatedGpio`] keeps line levels in memory.

use crate::error::{Result, ServiceError};
use crate::gpio::pin::PinMode;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Line-level GPIO operations, addressed by BCM GPIO number.
pub trait GpioBackend: Send {
    /// Configure a line as input with pull-down biasing.
    fn configure_input(&mut self, gpio_id: u8) -> Result<()>;

    /// Configure a line as output and drive it low.
    fn configure_output(&mut self, gpio_id: u8) -> Result<()>;

    /// Read the level of an input line.
    fn read(&mut self, gpio_id: u8) -> Result<bool>;

    /// Drive an output line.
    fn write(&mut self, gpio_id: u8, value: bool) -> Result<()>;
}

#[cfg(feature = "gpio")]
mod raspberry_pi {
    use super::*;
    use rppal::gpio::{Gpio, InputPin, OutputPin};

    /// Raspberry Pi GPIO backend using rppal.
    pub struct RaspberryPiGpio {
        gpio: Gpio,
        inputs: HashMap<u8, InputPin>,
        outputs: HashMap<u8, OutputPin>,
    }

    impl RaspberryPiGpio {
        /// Open the GPIO peripheral.
        pub fn new() -> Result<Self> {
            let gpio = Gpio::new().map_err(|e| {
                ServiceError::gpio_error(format!("Failed to initialize GPIO: {}", e))
            })?;

            Ok(Self {
                gpio,
                inputs: HashMap::new(),
                outputs: HashMap::new(),
            })
        }

        fn claim(&self, gpio_id: u8) -> Result<rppal::gpio::Pin> {
            self.gpio.get(gpio_id).map_err(|e| {
                ServiceError::gpio_error(format!("Failed to access GPIO {}: {}", gpio_id, e))
            })
        }
    }

    impl GpioBackend for RaspberryPiGpio {
        fn configure_input(&mut self, gpio_id: u8) -> Result<()> {
            let pin = self.claim(gpio_id)?.into_input_pulldown();
            self.inputs.insert(gpio_id, pin);
            Ok(())
        }

        fn configure_output(&mut self, gpio_id: u8) -> Result<()> {
            let pin = self.claim(gpio_id)?.into_output_low();
            self.outputs.insert(gpio_id, pin);
            Ok(())
        }

        fn read(&mut self, gpio_id: u8) -> Result<bool> {
            self.inputs
                .get(&gpio_id)
                .map(|pin| pin.is_high())
                .ok_or_else(|| {
                    ServiceError::gpio_error(format!("GPIO {} is not configured as input", gpio_id))
                })
        }

        fn write(&mut self, gpio_id: u8, value: bool) -> Result<()> {
            let pin = self.outputs.get_mut(&gpio_id).ok_or_else(|| {
                ServiceError::gpio_error(format!("GPIO {} is not configured as output", gpio_id))
            })?;
            if value {
                pin.set_high();
            } else {
                pin.set_low();
            }
            Ok(())
        }
    }
}

#[cfg(feature = "gpio")]
pub use raspberry_pi::RaspberryPiGpio;

/// Open the hardware backend for this build.
pub fn open_hardware_backend() -> Result<Box<dyn GpioBackend>> {
    #[cfg(feature = "gpio")]
    {
        Ok(Box::new(RaspberryPiGpio::new()?))
    }

    #[cfg(not(feature = "gpio"))]
    {
        Err(ServiceError::gpio_error(
            "GPIO support not compiled in (build with the `gpio` feature)",
        ))
    }
}

#[derive(Debug, Default)]
struct SimulatedLines {
    modes: HashMap<u8, PinMode>,
    levels: HashMap<u8, bool>,
    failing: HashSet<u8>,
    fail_reads: bool,
    panic_on_read: bool,
}

/// In-memory GPIO lines.
///
/// Clones share the same lines, so a test can keep one handle to drive inputs
/// and inspect outputs while the manager owns another.
#[derive(Debug, Clone, Default)]
pub struct SimulatedGpio {
    lines: Arc<Mutex<SimulatedLines>>,
}

impl SimulatedGpio {
    /// Simulated lines, all unconfigured and low.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the level seen on an input line.
    pub fn set_input(&self, gpio_id: u8, level: bool) {
        self.lines.lock().levels.insert(gpio_id, level);
    }

    /// Set several input lines at once.
    pub fn set_inputs(&self, gpio_ids: &[u8], level: bool) {
        let mut lines = self.lines.lock();
        for &gpio_id in gpio_ids {
            lines.levels.insert(gpio_id, level);
        }
    }

    /// Current level of a line (driven value for outputs).
    pub fn level(&self, gpio_id: u8) -> bool {
        self.lines.lock().levels.get(&gpio_id).copied().unwrap_or(false)
    }

    /// Mode the line was configured with, if any.
    pub fn mode(&self, gpio_id: u8) -> Option<PinMode> {
        self.lines.lock().modes.get(&gpio_id).copied()
    }

    /// Make configuration of `gpio_id` fail.
    pub fn fail_configuration(&self, gpio_id: u8) {
        self.lines.lock().failing.insert(gpio_id);
    }

    /// Make every read fail until cleared.
    pub fn fail_reads(&self, fail: bool) {
        self.lines.lock().fail_reads = fail;
    }

    /// Panic inside the next read, taking down the calling thread.
    pub fn panic_on_next_read(&self) {
        self.lines.lock().panic_on_read = true;
    }

    fn configure(&self, gpio_id: u8, mode: PinMode) -> Result<()> {
        let mut lines = self.lines.lock();
        if lines.failing.contains(&gpio_id) {
            return Err(ServiceError::gpio_error(format!(
                "Failed to configure GPIO {} as {:?}",
                gpio_id, mode
            )));
        }
        lines.modes.insert(gpio_id, mode);
        match mode {
            PinMode::Input => {
                lines.levels.entry(gpio_id).or_insert(false);
            }
            PinMode::Output => {
                lines.levels.insert(gpio_id, false);
            }
        }
        Ok(())
    }
}

impl GpioBackend for SimulatedGpio {
    fn configure_input(&mut self, gpio_id: u8) -> Result<()> {
        self.configure(gpio_id, PinMode::Input)
    }

    fn configure_output(&mut self, gpio_id: u8) -> Result<()> {
        self.configure(gpio_id, PinMode::Output)
    }

    fn read(&mut self, gpio_id: u8) -> Result<bool> {
        let mut lines = self.lines.lock();
        if lines.panic_on_read {
            lines.panic_on_read = false;
            drop(lines);
            panic!("simulated GPIO fault reading GPIO {}", gpio_id);
        }
        if lines.fail_reads {
            return Err(ServiceError::gpio_error(format!(
                "Simulated read failure on GPIO {}",
                gpio_id
            )));
        }
        match lines.modes.get(&gpio_id) {
            Some(PinMode::Input) => Ok(lines.levels.get(&gpio_id).copied().unwrap_or(false)),
            _ => Err(ServiceError::gpio_error(format!(
                "GPIO {} is not configured as input",
                gpio_id
            ))),
        }
    }

    fn write(&mut self, gpio_id: u8, value: bool) -> Result<()> {
        let mut lines = self.lines.lock();
        if lines.modes.get(&gpio_id) != Some(&PinMode::Output) {
            return Err(ServiceError::gpio_error(format!(
                "GPIO {} is not configured as output",
                gpio_id
            )));
        }
        lines.levels.insert(gpio_id, value);
        Ok(())
    }
}
