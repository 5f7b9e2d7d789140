//! Watchdog thread that keeps the GPIO poller alive.

use crate::gpio::GpioManager;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error};

/// Default period between maintenance passes.
pub const MONITOR_INTERVAL: Duration = Duration::from_millis(1000);

/// Calls [`GpioManager::maintenance`] on a fixed period until stopped.
pub struct HealthMonitor {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    /// Start the monitor thread, running `maintenance` every `interval`.
    pub fn spawn(gpio: Arc<GpioManager>, interval: Duration) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("health".to_string())
            .spawn(move || {
                debug!("Health monitor running every {:?}", interval);
                while !flag.load(Ordering::Relaxed) {
                    // A panicking pass must not take the monitor down with it
                    if panic::catch_unwind(AssertUnwindSafe(|| gpio.maintenance())).is_err() {
                        error!("GPIO maintenance pass panicked");
                    }
                    thread::sleep(interval);
                }
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stop the monitor and wait for its thread to exit.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GpioConfig;
    use crate::gpio::{Bank, SimulatedGpio};
    use crate::health::ErrorHandler;
    use std::time::Instant;

    #[test]
    fn test_monitor_restarts_dead_poller() {
        let sim = SimulatedGpio::new();
        let gpio = Arc::new(GpioManager::new(
            GpioConfig::default().with_polling_interval_ms(1).with_sticky_high_input_ms(0),
            Some(Box::new(sim.clone())),
            ErrorHandler::default(),
        ));
        gpio.initialize();
        let mut monitor = HealthMonitor::spawn(Arc::clone(&gpio), Duration::from_millis(20)).unwrap();

        sim.panic_on_next_read();
        let deadline = Instant::now() + Duration::from_secs(5);
        sim.set_input(2, true);
        while gpio.bank(Bank::Input1) != "10000000" && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        monitor.stop();

        assert_eq!(gpio.bank(Bank::Input1), "10000000");
        assert!(gpio.is_running());
    }
}
