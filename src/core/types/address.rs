//! Remote address wrapper with hex parsing

use super::error::{CeError, CeResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An address in the target process.
///
/// Remote processes may be 64-bit regardless of the client's pointer width,
/// so the value is always held as `u64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub u64);

impl Address {
    /// Creates a new address
    pub const fn new(value: u64) -> Self {
        Address(value)
    }

    /// Creates a null address (0x0)
    pub const fn null() -> Self {
        Address(0)
    }

    /// Checks if the address is null
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Adds a signed offset, wrapping on overflow like the target's pointer arithmetic
    pub const fn offset(&self, offset: i64) -> Self {
        Address(self.0.wrapping_add_signed(offset))
    }

    /// Returns the raw value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl FromStr for Address {
    type Err = CeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex_or_decimal(s)
            .map(Address::new)
            .map_err(|_| CeError::InvalidAddress(s.trim().to_string()))
    }
}

/// Parses `0x1F`, `$1F`, `1F` (letters imply hex) or `31`.
pub(crate) fn parse_hex_or_decimal(s: &str) -> CeResult<u64> {
    let s = s.trim();
    let value = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else if let Some(hex) = s.strip_prefix('$') {
        u64::from_str_radix(hex, 16)
    } else if s.chars().any(|c| c.is_ascii_alphabetic()) {
        u64::from_str_radix(s, 16)
    } else {
        s.parse::<u64>()
    };
    value.map_err(|_| CeError::InvalidAddress(s.to_string()))
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

impl fmt::UpperHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl From<u64> for Address {
    fn from(value: u64) -> Self {
        Address::new(value)
    }
}

impl From<Address> for u64 {
    fn from(address: Address) -> Self {
        address.0
    }
}
