//! Scoped process attachment
//!
//! [`AttachedProcess`] pairs a session with a process handle it opened and
//! closes that handle when it goes out of scope.

use crate::core::types::{Address, CeResult, ProcessId, RegionInfo};
use crate::memory::reader::MemorySource;
use crate::protocol::session::Session;
use crate::protocol::transport::Stream;
use crate::process::handle::ProcessHandle;
use std::net::TcpStream;
use tracing::{info, warn};

/// An opened process bound to the session that opened it
pub struct AttachedProcess<'a, S: Stream = TcpStream> {
    session: &'a mut Session<S>,
    handle: Option<ProcessHandle>,
    pid: ProcessId,
}

impl<'a, S: Stream> AttachedProcess<'a, S> {
    /// Opens `pid`; `Ok(None)` when the server refuses
    pub fn attach(session: &'a mut Session<S>, pid: ProcessId) -> CeResult<Option<Self>> {
        let Some(handle) = session.open_process(pid)? else {
            return Ok(None);
        };
        info!(pid, "attached to process");
        Ok(Some(AttachedProcess {
            session,
            handle: Some(handle),
            pid,
        }))
    }

    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    /// The underlying handle, for calls not wrapped here
    pub fn handle(&self) -> Option<&ProcessHandle> {
        self.handle.as_ref()
    }

    /// The session the process was opened on
    pub fn session(&mut self) -> &mut Session<S> {
        &mut *self.session
    }

    /// Region containing `address`, or the next mapped one after it
    pub fn query_region(&mut self, address: Address) -> CeResult<Option<RegionInfo>> {
        match &self.handle {
            Some(handle) => self.session.virtual_query_ex(handle, address.as_u64()),
            None => Ok(None),
        }
    }

    /// Closes the handle now and reports the outcome
    pub fn detach(mut self) -> CeResult<()> {
        match self.handle.take() {
            Some(handle) => self.session.close_handle(handle),
            None => Ok(()),
        }
    }
}

impl<S: Stream> MemorySource for AttachedProcess<'_, S> {
    fn read_bytes(&mut self, address: Address, size: u32) -> CeResult<Option<Vec<u8>>> {
        match &self.handle {
            Some(handle) => self.session.read_memory(handle, address.as_u64(), size),
            None => Ok(None),
        }
    }
}

impl<S: Stream> Drop for AttachedProcess<'_, S> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.session.close_handle(handle) {
                warn!(pid = self.pid, error = %e, "failed to close process handle");
            }
        }
    }
}
