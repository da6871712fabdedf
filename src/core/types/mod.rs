//! Core type definitions for the ceserver client
//!
//! This module contains all fundamental types used throughout the crate,
//! including remote addresses, decoded memory values, snapshot records, and
//! error types.

mod address;
mod error;
mod process_info;
mod value;

pub(crate) use address::parse_hex_or_decimal;

// Re-export all public types
pub use address::Address;
pub use error::{CeError, CeResult};
pub use process_info::{ModuleEntry, ProcessEntry, RegionInfo};
pub use value::{MemoryValue, ValueType};

// Common type aliases
pub type ProcessId = u32;
pub type Offset = i64;
