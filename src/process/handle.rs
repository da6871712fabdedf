//! Server-issued handles
//!
//! Handles are opaque 32-bit values that reference state inside ceserver (an
//! opened process or an active snapshot cursor). They are deliberately
//! neither `Copy` nor `Clone`: closing one consumes it, so a closed handle
//! cannot be named again. Each handle also records the id of the session
//! that issued it, since the raw values of two connections overlap.

use crate::core::types::ProcessId;
use std::fmt;

/// What a server handle refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Process,
    Snapshot,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleKind::Process => write!(f, "process"),
            HandleKind::Snapshot => write!(f, "snapshot"),
        }
    }
}

/// Common view of every handle type
pub trait ServerHandle {
    const KIND: HandleKind;

    /// Raw value as sent on the wire
    fn raw(&self) -> u32;

    /// Id of the session connection that issued the handle
    fn session_id(&self) -> u64;
}

/// Handle to a process opened with CMD_OPENPROCESS
#[derive(PartialEq, Eq, Hash)]
pub struct ProcessHandle {
    session: u64,
    raw: u32,
    pid: ProcessId,
}

impl ProcessHandle {
    pub(crate) fn new(session: u64, raw: u32, pid: ProcessId) -> Self {
        ProcessHandle { session, raw, pid }
    }

    /// Get the process ID this handle was opened for
    pub fn pid(&self) -> ProcessId {
        self.pid
    }
}

impl ServerHandle for ProcessHandle {
    const KIND: HandleKind = HandleKind::Process;

    fn raw(&self) -> u32 {
        self.raw
    }

    fn session_id(&self) -> u64 {
        self.session
    }
}

/// Handle to a process or module snapshot cursor
#[derive(PartialEq, Eq, Hash)]
pub struct SnapshotHandle {
    session: u64,
    raw: u32,
    flags: u32,
    pid: ProcessId,
}

impl SnapshotHandle {
    pub(crate) fn new(session: u64, raw: u32, flags: u32, pid: ProcessId) -> Self {
        SnapshotHandle {
            session,
            raw,
            flags,
            pid,
        }
    }

    /// Flags the snapshot was created with
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Process the snapshot was taken for (0 for process lists)
    pub fn pid(&self) -> ProcessId {
        self.pid
    }
}

impl ServerHandle for SnapshotHandle {
    const KIND: HandleKind = HandleKind::Snapshot;

    fn raw(&self) -> u32 {
        self.raw
    }

    fn session_id(&self) -> u64 {
        self.session
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("raw", &format!("0x{:X}", self.raw))
            .field("pid", &self.pid)
            .finish()
    }
}

impl fmt::Debug for SnapshotHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotHandle")
            .field("raw", &format!("0x{:X}", self.raw))
            .field("flags", &format!("0x{:X}", self.flags))
            .field("pid", &self.pid)
            .finish()
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcessHandle(0x{:X}, pid={})", self.raw, self.pid)
    }
}

impl fmt::Display for SnapshotHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotHandle(0x{:X}, flags=0x{:X})", self.raw, self.flags)
    }
}
