//! Reading remote memory
//!
//! - [`reader`]: typed reads over any [`MemorySource`]
//! - [`pointer`]: multi-level pointer chains
//! - [`batch`]: parallel reads over one session per worker

pub mod batch;
pub mod pointer;
pub mod reader;

pub use batch::{BatchRead, BatchReader};
pub use pointer::{parse_offset, read_chain_value, resolve, PointerChain};
pub use reader::{MemorySource, ProcessMemory, MIN_POINTER};
