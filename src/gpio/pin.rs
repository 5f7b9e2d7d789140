//! Physical pin descriptors and the sticky-high input filter.

use crate::gpio::bank::Bank;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Number of addressable slots in the pin table.
pub const PIN_COUNT: usize = 32;

/// Direction of a pin, fixed for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinMode {
    Input,
    Output,
}

/// Immutable identity of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PinSpec {
    pub mode: PinMode,
    pub bank: Bank,
    pub bit: u8,
    /// BCM GPIO number
    pub gpio_id: u8,
    /// Physical header pin, informational only
    pub pin_id: u8,
}

const fn input(bank: Bank, bit: u8, gpio_id: u8, pin_id: u8) -> Option<PinSpec> {
    Some(PinSpec {
        mode: PinMode::Input,
        bank,
        bit,
        gpio_id,
        pin_id,
    })
}

const fn output(bit: u8, gpio_id: u8, pin_id: u8) -> Option<PinSpec> {
    Some(PinSpec {
        mode: PinMode::Output,
        bank: Bank::Output,
        bit,
        gpio_id,
        pin_id,
    })
}

/// Fixed pin table, indexed by slot. Slot index equals the BCM GPIO number.
pub const PIN_MAP: [Option<PinSpec>; PIN_COUNT] = [
    None,
    None,
    // GPIO 2 and 3 carry the board's I2C pull-ups and always read high
    input(Bank::Input1, 0, 2, 3),
    input(Bank::Input1, 1, 3, 5),
    input(Bank::Input1, 2, 4, 7),
    input(Bank::Input1, 3, 5, 29),
    input(Bank::Input1, 4, 6, 31),
    input(Bank::Input1, 5, 7, 26),
    input(Bank::Input1, 6, 8, 24),
    input(Bank::Input1, 7, 9, 21),
    output(0, 10, 19),
    output(1, 11, 23),
    output(2, 12, 32),
    output(3, 13, 33),
    None,
    None,
    output(4, 16, 36),
    output(5, 17, 11),
    output(6, 18, 12),
    output(7, 19, 35),
    input(Bank::Input2, 0, 20, 38),
    input(Bank::Input2, 1, 21, 40),
    input(Bank::Input2, 2, 22, 15),
    input(Bank::Input2, 3, 23, 16),
    input(Bank::Input2, 4, 24, 18),
    input(Bank::Input2, 5, 25, 22),
    input(Bank::Input2, 6, 26, 37),
    input(Bank::Input2, 7, 27, 13),
    None,
    None,
    None,
    None,
];

/// A single I/O line and its last observed or staged value.
///
/// Input pins carry a hold deadline: a rising edge arms it for the sticky
/// duration, and while it has not expired [`Pin::value_at`] reports `true` even
/// if the line has already dropped. The deadline is only armed on the leading
/// edge; a sustained high never extends it.
#[derive(Debug, Clone, Copy)]
pub struct Pin {
    spec: PinSpec,
    value: bool,
    high_until: Option<Instant>,
    available: bool,
}

impl Pin {
    /// A pin at `false` with no hold armed.
    pub fn new(spec: PinSpec) -> Self {
        Self {
            spec,
            value: false,
            high_until: None,
            available: true,
        }
    }

    /// Static description of this slot.
    pub fn spec(&self) -> &PinSpec {
        &self.spec
    }

    /// Input or output.
    pub fn mode(&self) -> PinMode {
        self.spec.mode
    }

    /// BCM GPIO line number.
    pub fn gpio_id(&self) -> u8 {
        self.spec.gpio_id
    }

    /// False once the pin failed its electrical configuration.
    pub fn is_available(&self) -> bool {
        self.available
    }

    pub(crate) fn mark_unavailable(&mut self) {
        self.available = false;
    }

    /// Record a new raw value. `sticky` is ignored for output pins.
    pub fn set_value(&mut self, value: bool, sticky: Duration) {
        self.set_value_at(value, sticky, Instant::now());
    }

    /// Like [`Pin::set_value`] with an explicit clock.
    pub fn set_value_at(&mut self, value: bool, sticky: Duration, now: Instant) {
        if self.spec.mode == PinMode::Input {
            if value && !self.value {
                self.high_until = now.checked_add(sticky);
            } else if !value && self.high_until.is_some_and(|until| now >= until) {
                self.high_until = None;
            }
        }
        self.value = value;
    }

    /// Value as seen by readers, including any sticky-high hold.
    pub fn value(&self) -> bool {
        self.value_at(Instant::now())
    }

    /// Like [`Pin::value`] with an explicit clock.
    pub fn value_at(&self, now: Instant) -> bool {
        if self.spec.mode == PinMode::Input && self.high_until.is_some_and(|until| now < until) {
            return true;
        }
        self.value
    }

    /// Last raw value, ignoring the hold.
    pub fn raw_value(&self) -> bool {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::bank::{pin_index, BANK_WIDTH};

    const STICKY: Duration = Duration::from_millis(200);

    fn input_pin() -> Pin {
        Pin::new(PIN_MAP[4].unwrap())
    }

    #[test]
    fn test_pin_map_matches_bank_tables() {
        for bank in Bank::ALL {
            for bit in 0..BANK_WIDTH {
                let index = pin_index(bank, bit).unwrap();
                let spec = PIN_MAP[index].expect("bank slot must be populated");
                assert_eq!(spec.bank, bank);
                assert_eq!(spec.bit as usize, bit);
                assert_eq!(spec.gpio_id as usize, index);
                let expected = if bank == Bank::Output {
                    PinMode::Output
                } else {
                    PinMode::Input
                };
                assert_eq!(spec.mode, expected);
            }
        }
        assert_eq!(PIN_MAP.iter().flatten().count(), 24);
    }

    #[test]
    fn test_short_pulse_is_held() {
        let mut pin = input_pin();
        let t0 = Instant::now();
        pin.set_value_at(true, STICKY, t0);
        pin.set_value_at(false, STICKY, t0 + Duration::from_millis(1));

        assert!(pin.value_at(t0 + Duration::from_millis(1)));
        assert!(pin.value_at(t0 + Duration::from_millis(199)));
        assert!(!pin.value_at(t0 + Duration::from_millis(200)));
        assert!(!pin.raw_value());
    }

    #[test]
    fn test_sustained_high_does_not_rearm() {
        let mut pin = input_pin();
        let t0 = Instant::now();
        pin.set_value_at(true, STICKY, t0);
        for ms in (15..600).step_by(15) {
            let now = t0 + Duration::from_millis(ms);
            pin.set_value_at(true, STICKY, now);
            assert!(pin.value_at(now));
        }

        let drop_at = t0 + Duration::from_millis(600);
        pin.set_value_at(false, STICKY, drop_at);
        assert!(!pin.value_at(drop_at));
    }

    #[test]
    fn test_new_leading_edge_rearms() {
        let mut pin = input_pin();
        let t0 = Instant::now();
        pin.set_value_at(true, STICKY, t0);
        pin.set_value_at(false, STICKY, t0 + Duration::from_millis(10));
        pin.set_value_at(true, STICKY, t0 + Duration::from_millis(150));
        pin.set_value_at(false, STICKY, t0 + Duration::from_millis(160));

        assert!(pin.value_at(t0 + Duration::from_millis(300)));
        assert!(!pin.value_at(t0 + Duration::from_millis(350)));
    }

    #[test]
    fn test_output_has_no_hold() {
        let mut pin = Pin::new(PIN_MAP[10].unwrap());
        let t0 = Instant::now();
        pin.set_value_at(true, STICKY, t0);
        pin.set_value_at(false, STICKY, t0);
        assert!(!pin.value_at(t0));
    }
}
