//! Process and module enumeration through server-side snapshots
//!
//! Every snapshot handle is owned by a [`SnapshotGuard`], which releases it
//! exactly once: explicitly through [`SnapshotGuard::close`], or on drop when
//! enumeration stopped early or failed.

use crate::core::types::{Address, CeResult, ModuleEntry, ProcessEntry, ProcessId};
use crate::protocol::command::snapshot_flags::{TH32CS_SNAPMODULE, TH32CS_SNAPPROCESS};
use crate::protocol::session::Session;
use crate::protocol::transport::Stream;
use crate::process::handle::SnapshotHandle;
use std::net::TcpStream;
use tracing::{debug, warn};

/// Closes its snapshot handle when dropped
pub struct SnapshotGuard<'a, S: Stream = TcpStream> {
    session: &'a mut Session<S>,
    handle: Option<SnapshotHandle>,
}

impl<'a, S: Stream> SnapshotGuard<'a, S> {
    /// Creates a snapshot on `session`
    pub fn create(session: &'a mut Session<S>, flags: u32, pid: ProcessId) -> CeResult<Self> {
        let handle = session.create_snapshot(flags, pid)?;
        Ok(SnapshotGuard {
            session,
            handle: Some(handle),
        })
    }

    /// Runs `f` with the session and the live handle
    fn with<T>(
        &mut self,
        f: impl FnOnce(&mut Session<S>, &SnapshotHandle) -> CeResult<T>,
    ) -> CeResult<T> {
        match &self.handle {
            Some(handle) => f(&mut *self.session, handle),
            None => Err(crate::core::types::CeError::invalid_handle(
                "snapshot already closed",
            )),
        }
    }

    /// Releases the handle and reports the outcome
    pub fn close(mut self) -> CeResult<()> {
        match self.handle.take() {
            Some(handle) => self.session.close_handle(handle),
            None => Ok(()),
        }
    }
}

impl<S: Stream> Drop for SnapshotGuard<'_, S> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let description = handle.to_string();
            if let Err(e) = self.session.close_handle(handle) {
                warn!(handle = %description, error = %e, "failed to release snapshot");
            }
        }
    }
}

/// Which first/next pair a cursor walks
trait SnapshotWalk<S: Stream> {
    type Entry;

    fn first(session: &mut Session<S>, handle: &SnapshotHandle) -> CeResult<Option<Self::Entry>>;
    fn next(session: &mut Session<S>, handle: &SnapshotHandle) -> CeResult<Option<Self::Entry>>;
}

struct ProcessWalk;
struct ModuleWalk;

impl<S: Stream> SnapshotWalk<S> for ProcessWalk {
    type Entry = ProcessEntry;

    fn first(session: &mut Session<S>, handle: &SnapshotHandle) -> CeResult<Option<ProcessEntry>> {
        session.process_first(handle)
    }

    fn next(session: &mut Session<S>, handle: &SnapshotHandle) -> CeResult<Option<ProcessEntry>> {
        session.process_next(handle)
    }
}

impl<S: Stream> SnapshotWalk<S> for ModuleWalk {
    type Entry = ModuleEntry;

    fn first(session: &mut Session<S>, handle: &SnapshotHandle) -> CeResult<Option<ModuleEntry>> {
        session.module_first(handle)
    }

    fn next(session: &mut Session<S>, handle: &SnapshotHandle) -> CeResult<Option<ModuleEntry>> {
        session.module_next(handle)
    }
}

/// Lazy first/next cursor over a guarded snapshot
struct Cursor<'a, S: Stream, W> {
    guard: SnapshotGuard<'a, S>,
    started: bool,
    finished: bool,
    _walk: std::marker::PhantomData<W>,
}

impl<'a, S: Stream, W: SnapshotWalk<S>> Cursor<'a, S, W> {
    fn new(guard: SnapshotGuard<'a, S>) -> Self {
        Cursor {
            guard,
            started: false,
            finished: false,
            _walk: std::marker::PhantomData,
        }
    }

    fn advance(&mut self) -> Option<CeResult<W::Entry>> {
        if self.finished {
            return None;
        }
        let first = !self.started;
        self.started = true;
        let step = self.guard.with(|session, handle| {
            if first {
                W::first(session, handle)
            } else {
                W::next(session, handle)
            }
        });
        match step {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Iterates the server's process list; the snapshot is released on drop
pub struct ProcessIter<'a, S: Stream = TcpStream> {
    cursor: Cursor<'a, S, ProcessWalk>,
}

impl<'a, S: Stream> ProcessIter<'a, S> {
    pub fn new(session: &'a mut Session<S>) -> CeResult<Self> {
        let guard = SnapshotGuard::create(session, TH32CS_SNAPPROCESS, 0)?;
        Ok(ProcessIter {
            cursor: Cursor::new(guard),
        })
    }

    /// Releases the snapshot now, surfacing a failed close
    pub fn close(self) -> CeResult<()> {
        self.cursor.guard.close()
    }
}

impl<S: Stream> Iterator for ProcessIter<'_, S> {
    type Item = CeResult<ProcessEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.advance()
    }
}

/// Iterates the modules of one process; the snapshot is released on drop
pub struct ModuleIter<'a, S: Stream = TcpStream> {
    cursor: Cursor<'a, S, ModuleWalk>,
}

impl<'a, S: Stream> ModuleIter<'a, S> {
    pub fn new(session: &'a mut Session<S>, pid: ProcessId) -> CeResult<Self> {
        let guard = SnapshotGuard::create(session, TH32CS_SNAPMODULE, pid)?;
        Ok(ModuleIter {
            cursor: Cursor::new(guard),
        })
    }

    pub fn close(self) -> CeResult<()> {
        self.cursor.guard.close()
    }
}

impl<S: Stream> Iterator for ModuleIter<'_, S> {
    type Item = CeResult<ModuleEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.advance()
    }
}

/// Lists every process the server can see
pub fn enumerate_processes<S: Stream>(session: &mut Session<S>) -> CeResult<Vec<ProcessEntry>> {
    let mut iter = ProcessIter::new(session)?;
    let entries = iter.by_ref().collect::<CeResult<Vec<_>>>()?;
    iter.close()?;
    debug!(count = entries.len(), "enumerated processes");
    Ok(entries)
}

/// Lists the modules loaded in `pid`
pub fn enumerate_modules<S: Stream>(
    session: &mut Session<S>,
    pid: ProcessId,
) -> CeResult<Vec<ModuleEntry>> {
    let mut iter = ModuleIter::new(session, pid)?;
    let entries = iter.by_ref().collect::<CeResult<Vec<_>>>()?;
    iter.close()?;
    debug!(pid, count = entries.len(), "enumerated modules");
    Ok(entries)
}

/// First process whose name contains `needle`, stopping the walk early
pub fn find_process_by_name<S: Stream>(
    session: &mut Session<S>,
    needle: &str,
) -> CeResult<Option<ProcessEntry>> {
    for entry in ProcessIter::new(session)? {
        let entry = entry?;
        if entry.name_contains(needle) {
            return Ok(Some(entry));
        }
    }
    Ok(None)
}

/// Module of `pid` whose basename equals `name`
pub fn find_module_by_name<S: Stream>(
    session: &mut Session<S>,
    pid: ProcessId,
    name: &str,
) -> CeResult<Option<ModuleEntry>> {
    for entry in ModuleIter::new(session, pid)? {
        let entry = entry?;
        if entry.basename() == name {
            return Ok(Some(entry));
        }
    }
    Ok(None)
}

/// Base address of the named module, if loaded
pub fn module_base<S: Stream>(
    session: &mut Session<S>,
    pid: ProcessId,
    name: &str,
) -> CeResult<Option<Address>> {
    Ok(find_module_by_name(session, pid, name)?.map(|m| m.base_address))
}
