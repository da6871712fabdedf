//! Client for the ceserver remote process-inspection protocol
//!
//! Connects to a ceserver instance over TCP, enumerates processes and
//! modules through server-side snapshots, and reads remote memory as raw
//! bytes, typed values, strings or pointer chains.
//!
//! ```no_run
//! use ceserver_client::{enumerate_processes, AttachedProcess, ConnectOptions, Session};
//! use ceserver_client::memory::PointerChain;
//! use ceserver_client::ValueType;
//!
//! # fn main() -> ceserver_client::CeResult<()> {
//! let mut session = Session::connect(ConnectOptions::new("127.0.0.1", 52736))?;
//! let processes = enumerate_processes(&mut session)?;
//! if let Some(target) = processes.iter().find(|p| p.name_contains("game")) {
//!     if let Some(mut process) = AttachedProcess::attach(&mut session, target.pid)? {
//!         let chain: PointerChain = "0x7f0000001000 -> 0x10 -> 0x8".parse()?;
//!         let health = chain.read_value(&mut process, 0, ValueType::I32)?;
//!         println!("{:?}", health);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod memory;
pub mod process;
pub mod protocol;

// Re-export main types from core module
pub use core::types::{
    Address, CeError, CeResult, MemoryValue, ModuleEntry, Offset, ProcessEntry, ProcessId,
    RegionInfo, ValueType,
};

pub use core::{DEFAULT_PORT, VERSION};
pub use process::{
    enumerate_modules, enumerate_processes, find_module_by_name, find_process_by_name,
    AttachedProcess, ProcessHandle, SnapshotHandle,
};
pub use protocol::{ConnectOptions, ServerVersion, Session, SharedSession};
