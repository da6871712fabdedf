//! Remote process access: handles, attachment and enumeration

pub mod attach;
pub mod enumerator;
pub mod handle;

pub use attach::AttachedProcess;
pub use enumerator::{
    enumerate_modules, enumerate_processes, find_module_by_name, find_process_by_name,
    module_base, ModuleIter, ProcessIter, SnapshotGuard,
};
pub use handle::{HandleKind, ProcessHandle, ServerHandle, SnapshotHandle};
