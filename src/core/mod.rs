//! Core module containing fundamental types for the ceserver client
//!
//! This module provides the foundational building blocks used throughout
//! the crate, including address handling, memory values, snapshot records,
//! and error types.

pub mod types;

// Re-export commonly used types for convenience
pub use types::{Address, CeError, CeResult, MemoryValue, ModuleEntry, ProcessEntry, ValueType};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Port ceserver listens on unless told otherwise
pub const DEFAULT_PORT: u16 = 52736;
