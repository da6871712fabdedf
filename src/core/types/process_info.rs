//! Process, module and region records reported by the server

use super::{Address, ProcessId};
use serde::{Deserialize, Serialize};

/// A process reported by a process snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEntry {
    pub pid: ProcessId,
    pub name: String,
}

impl ProcessEntry {
    /// Creates a new process entry
    pub fn new(pid: ProcessId, name: impl Into<String>) -> Self {
        ProcessEntry {
            pid,
            name: name.into(),
        }
    }

    /// Substring match on the reported name.
    ///
    /// Android reports package names (`com.example.game`) and Linux reports
    /// command lines, so exact matching is rarely what a caller wants.
    pub fn name_contains(&self, needle: &str) -> bool {
        self.name.contains(needle)
    }
}

/// A loaded module (or one mapped part of it) reported by a module snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub base_address: Address,
    pub part: i32,
    pub size: u32,
    pub file_offset: u32,
    pub name: String,
}

impl ModuleEntry {
    /// Creates a new module entry for the first part of a module
    pub fn new(name: impl Into<String>, base_address: Address, size: u32) -> Self {
        ModuleEntry {
            base_address,
            part: 0,
            size,
            file_offset: 0,
            name: name.into(),
        }
    }

    /// File name without the directory, e.g. `libg.so` for `/data/app/lib/arm64/libg.so`
    pub fn basename(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Gets the end address of the module part
    pub fn end_address(&self) -> Address {
        self.base_address.offset(self.size as i64)
    }

    /// Checks if an address is within this module part
    pub fn contains_address(&self, address: Address) -> bool {
        address >= self.base_address && address < self.end_address()
    }
}

/// A memory region reported by `virtual_query_ex`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionInfo {
    pub base_address: Address,
    pub size: u64,
    pub protection: u32,
    pub region_type: u32,
}

impl RegionInfo {
    const PAGE_NOACCESS: u32 = 0x01;

    /// Whether the protection flags allow reading
    pub fn is_readable(&self) -> bool {
        self.protection != 0 && self.protection & Self::PAGE_NOACCESS == 0
    }

    /// Checks if an address is within this region
    pub fn contains_address(&self, address: Address) -> bool {
        address >= self.base_address && address.0 - self.base_address.0 < self.size
    }
}
