//! Bank addressing and the canonical bank string format.
//!
//! A bank is eight pins addressed together. Its string form is exactly eight
//! ASCII characters, `'1'` or `'0'`, bit 0 first: `[true, false, ...]` renders
//! as `"10......"`.

use crate::error::{Result, ServiceError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of bits in a bank.
pub const BANK_WIDTH: usize = 8;

/// One bank worth of pin values, indexed by bit.
pub type BankBits = [bool; BANK_WIDTH];

/// Logical 8-bit pin group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bank {
    Input1,
    Input2,
    Output,
}

impl Bank {
    pub const ALL: [Bank; 3] = [Bank::Input1, Bank::Input2, Bank::Output];

    /// Lowercase client-facing name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Bank::Input1 => "input1",
            Bank::Input2 => "input2",
            Bank::Output => "output",
        }
    }
}

impl fmt::Display for Bank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bank {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self> {
        Bank::ALL
            .into_iter()
            .find(|bank| bank.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ServiceError::invalid_argument(format!("Bank '{}' not valid", s)))
    }
}

// Pin table slots backing each bank, indexed by bit. Writes to the output bank
// and read-back of it both go through OUTPUT_PINS.
const INPUT1_PINS: [usize; BANK_WIDTH] = [2, 3, 4, 5, 6, 7, 8, 9];
const INPUT2_PINS: [usize; BANK_WIDTH] = [20, 21, 22, 23, 24, 25, 26, 27];
const OUTPUT_PINS: [usize; BANK_WIDTH] = [10, 11, 12, 13, 16, 17, 18, 19];

/// Pin table indices backing `bank`, bit 0 first.
pub fn pin_indices(bank: Bank) -> &'static [usize; BANK_WIDTH] {
    match bank {
        Bank::Input1 => &INPUT1_PINS,
        Bank::Input2 => &INPUT2_PINS,
        Bank::Output => &OUTPUT_PINS,
    }
}

/// Pin table index for `(bank, bit)`, or `None` if `bit` is out of range.
pub fn pin_index(bank: Bank, bit: usize) -> Option<usize> {
    pin_indices(bank).get(bit).copied()
}

/// Render bank bits as the canonical 8-character string.
pub fn encode(bits: &BankBits) -> String {
    bits.iter().map(|&bit| if bit { '1' } else { '0' }).collect()
}

/// Parse a canonical bank string.
pub fn decode(value: &str) -> Result<BankBits> {
    if value.chars().count() != BANK_WIDTH {
        return Err(ServiceError::invalid_argument(format!(
            "Bank value '{}' incorrect length",
            value
        )));
    }

    let mut bits = [false; BANK_WIDTH];
    for (bit, c) in bits.iter_mut().zip(value.chars()) {
        *bit = match c {
            '1' => true,
            '0' => false,
            _ => {
                return Err(ServiceError::invalid_argument(format!(
                    "Bank value '{}' not valid",
                    value
                )))
            }
        };
    }
    Ok(bits)
}
