//! The GPIO manager: pin table, bank snapshots and the polling thread.
//!
//! All pin state lives behind one reader/writer lock. The polling thread takes
//! the write lock for a whole cycle (stage pending output, sample and drive
//! every pin, republish the three bank snapshots), so a reader holding the
//! read lock always sees banks from a single complete cycle. Writes from
//! callers are only staged; hardware is touched exclusively by the poll cycle.

use crate::config::GpioConfig;
use crate::error::{Result, ServiceError};
use crate::gpio::backend::GpioBackend;
use crate::gpio::bank::{self, Bank, BankBits, BANK_WIDTH};
use crate::gpio::pin::{Pin, PinMode, PinSpec, PIN_COUNT, PIN_MAP};
use crate::health::ErrorHandler;
use crate::stats::CpsCalculator;
use parking_lot::{Condvar, Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How long `maintenance` waits for the polling thread's first start.
const STARTUP_WAIT: Duration = Duration::from_millis(1000);

/// GPIO section of the runtime statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GpioStatistics {
    pub input1: String,
    pub input2: String,
    pub output: String,
    /// Poll cycles per second, one decimal
    pub cps: String,
}

/// Inspection view of one populated pin slot.
#[derive(Debug, Clone, Serialize)]
pub struct PinStatus {
    pub index: usize,
    #[serde(flatten)]
    pub spec: PinSpec,
    pub value: bool,
    pub available: bool,
}

struct GpioState {
    pins: [Option<Pin>; PIN_COUNT],
    input1: BankBits,
    input2: BankBits,
    output_read: BankBits,
    output_write: BankBits,
}

impl GpioState {
    fn new() -> Self {
        Self {
            pins: PIN_MAP.map(|slot| slot.map(Pin::new)),
            input1: [false; BANK_WIDTH],
            input2: [false; BANK_WIDTH],
            output_read: [false; BANK_WIDTH],
            output_write: [false; BANK_WIDTH],
        }
    }

    fn snapshot(&self, bank: Bank) -> BankBits {
        match bank {
            Bank::Input1 => self.input1,
            Bank::Input2 => self.input2,
            Bank::Output => self.output_read,
        }
    }

    fn run_cycle(
        &mut self,
        backend: &mut dyn GpioBackend,
        sticky: Duration,
        now: Instant,
    ) -> Result<()> {
        // Stage the pending write into the output pins
        for (bit, &index) in bank::pin_indices(Bank::Output).iter().enumerate() {
            if let Some(pin) = self.pins[index].as_mut().filter(|pin| pin.is_available()) {
                pin.set_value_at(self.output_write[bit], Duration::ZERO, now);
            }
        }

        for pin in self.pins.iter_mut().flatten() {
            if !pin.is_available() {
                continue;
            }
            match pin.mode() {
                PinMode::Input => {
                    let raw = backend.read(pin.gpio_id())?;
                    pin.set_value_at(raw, sticky, now);
                }
                PinMode::Output => backend.write(pin.gpio_id(), pin.value_at(now))?,
            }
        }

        self.input1 = self.collect(Bank::Input1, now);
        self.input2 = self.collect(Bank::Input2, now);
        self.output_read = self.collect(Bank::Output, now);
        Ok(())
    }

    fn collect(&self, bank: Bank, now: Instant) -> BankBits {
        let mut bits = [false; BANK_WIDTH];
        for (bit, &index) in bank::pin_indices(bank).iter().enumerate() {
            if let Some(pin) = &self.pins[index] {
                bits[bit] = pin.value_at(now);
            }
        }
        bits
    }
}

/// Set-once flag the polling thread raises when it first runs.
#[derive(Default)]
struct StartSignal {
    started: Mutex<bool>,
    cond: Condvar,
}

impl StartSignal {
    fn set(&self) {
        *self.started.lock() = true;
        self.cond.notify_all();
    }

    fn wait(&self, timeout: Duration) -> bool {
        let mut started = self.started.lock();
        let _ = self
            .cond
            .wait_while_for(&mut started, |started| !*started, timeout);
        *started
    }
}

struct Shared {
    config: GpioConfig,
    state: RwLock<GpioState>,
    backend: Mutex<Option<Box<dyn GpioBackend>>>,
    cps: CpsCalculator,
    started: StartSignal,
    errors: ErrorHandler,
}

impl Shared {
    fn poll_cycle(&self) -> Result<()> {
        let mut state = self.state.write();
        let mut backend = self.backend.lock();
        let backend = backend
            .as_mut()
            .ok_or_else(|| ServiceError::gpio_error("GPIO is not supported on this platform"))?;

        self.cps.increment();
        state.run_cycle(&mut **backend, self.config.sticky_high(), Instant::now())
    }
}

fn polling_loop(shared: Arc<Shared>) {
    shared.started.set();
    debug!("GPIO polling thread running");
    loop {
        if let Err(e) = shared.poll_cycle() {
            shared.errors.report(&e);
        }
        thread::sleep(shared.config.polling_interval());
    }
}

/// Owns the pin table and runs the polling thread.
///
/// Without a backend (non-Linux host, GPIO support not compiled in) nothing
/// is polled and every bank reads `"00000000"`.
pub struct GpioManager {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl GpioManager {
    /// Create an idle manager. Nothing touches hardware until [`initialize`](Self::initialize).
    pub fn new(
        config: GpioConfig,
        backend: Option<Box<dyn GpioBackend>>,
        errors: ErrorHandler,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                state: RwLock::new(GpioState::new()),
                backend: Mutex::new(backend),
                cps: CpsCalculator::default(),
                started: StartSignal::default(),
                errors,
            }),
            thread: Mutex::new(None),
        }
    }

    /// Configure every pin and start the polling thread.
    ///
    /// Failures are reported, never returned: an unsupported platform leaves the
    /// manager idle, and a pin that fails to configure is left out of polling.
    /// Calling it again while the polling thread is alive does nothing.
    pub fn initialize(&self) {
        let mut thread = self.thread.lock();
        if thread.as_ref().is_some_and(|handle| !handle.is_finished()) {
            warn!("GPIO polling already running, ignoring initialize");
            return;
        }

        if let Err(e) = self.configure_pins() {
            self.shared.errors.report(&e);
            return;
        }

        match self.spawn_poller() {
            Ok(handle) => {
                *thread = Some(handle);
                info!(
                    "GPIO polling started ({}ms interval, {}ms sticky high)",
                    self.shared.config.polling_interval_ms, self.shared.config.sticky_high_input_ms
                );
            }
            Err(e) => self.shared.errors.report(&e),
        }
    }

    /// Apply each pin's electrical configuration: inputs pulled down, outputs
    /// driven low. Errors only if there is no backend at all.
    pub fn configure_pins(&self) -> Result<()> {
        let mut state = self.shared.state.write();
        let mut backend = self.shared.backend.lock();
        let backend = backend
            .as_mut()
            .ok_or_else(|| ServiceError::gpio_error("GPIO is not supported on this platform"))?;

        for pin in state.pins.iter_mut().flatten() {
            let configured = match pin.mode() {
                PinMode::Input => backend.configure_input(pin.gpio_id()),
                PinMode::Output => backend.configure_output(pin.gpio_id()),
            };
            if let Err(e) = configured {
                warn!("GPIO {} left out of polling", pin.gpio_id());
                pin.mark_unavailable();
                self.shared.errors.report(&e);
            }
        }
        Ok(())
    }

    /// Run one poll cycle on the calling thread.
    pub fn poll_once(&self) -> Result<()> {
        self.shared.poll_cycle()
    }

    /// Latest published value of `bank`.
    pub fn bank(&self, bank: Bank) -> String {
        let bits = self.shared.state.read().snapshot(bank);
        bank::encode(&bits)
    }

    /// Latest published value of the bank named by a client.
    pub fn bank_by_name(&self, name: &str) -> Result<String> {
        match name.parse::<Bank>() {
            Ok(bank) => Ok(self.bank(bank)),
            Err(e) => {
                self.shared.errors.report(&e);
                Err(e)
            }
        }
    }

    /// Stage `value` for the output bank. Applied by the next poll cycle.
    pub fn set_bank(&self, bank: Bank, value: &str) -> Result<()> {
        let bits = match Self::parse_write(bank, value) {
            Ok(bits) => bits,
            Err(e) => {
                self.shared.errors.report(&e);
                return Err(e);
            }
        };
        self.shared.state.write().output_write = bits;
        Ok(())
    }

    fn parse_write(bank: Bank, value: &str) -> Result<BankBits> {
        if bank != Bank::Output {
            return Err(ServiceError::invalid_argument(format!(
                "Bank '{}' not valid for writing",
                bank
            )));
        }
        bank::decode(value)
    }

    /// Restart the polling thread if it has died. Called by the health monitor.
    ///
    /// Returns `true` when a new thread was started.
    pub fn maintenance(&self) -> bool {
        if !self.shared.started.wait(STARTUP_WAIT) {
            return false;
        }

        let mut thread = self.thread.lock();
        if thread.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }
        if let Some(handle) = thread.take() {
            if handle.join().is_err() {
                debug!("GPIO polling thread exited with a panic");
            }
        }

        match self.spawn_poller() {
            Ok(handle) => {
                *thread = Some(handle);
                self.shared.errors.report(&ServiceError::gpio_error(
                    "GPIO polling thread died and had to be restarted",
                ));
                true
            }
            Err(e) => {
                self.shared.errors.report(&e);
                false
            }
        }
    }

    /// Whether a polling thread exists and is still running.
    pub fn is_running(&self) -> bool {
        self.thread
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Current bank snapshots and poll rate for the statistics report.
    pub fn runtime_statistics(&self) -> GpioStatistics {
        let (input1, input2, output) = {
            let state = self.shared.state.read();
            (
                bank::encode(&state.input1),
                bank::encode(&state.input2),
                bank::encode(&state.output_read),
            )
        };
        GpioStatistics {
            input1,
            input2,
            output,
            cps: format!("{:.1}", self.shared.cps.cps()),
        }
    }

    /// Status of every populated pin slot, in slot order.
    pub fn pins(&self) -> Vec<PinStatus> {
        let state = self.shared.state.read();
        let now = Instant::now();
        state
            .pins
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.as_ref().map(|pin| PinStatus {
                    index,
                    spec: *pin.spec(),
                    value: pin.value_at(now),
                    available: pin.is_available(),
                })
            })
            .collect()
    }

    fn spawn_poller(&self) -> Result<JoinHandle<()>> {
        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name("gpio-poll".to_string())
            .spawn(move || polling_loop(shared))
            .map_err(|e| ServiceError::system_error(format!("Failed to start GPIO thread: {}", e)))
    }
}
