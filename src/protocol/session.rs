//! Request/response exchanges for each ceserver operation
//!
//! A [`Session`] owns one transport and the bookkeeping for every handle the
//! server issued on it. The protocol carries no request identifiers, so a
//! session needs `&mut self` for every exchange; sharing one connection
//! across threads goes through [`SharedSession`].
//!
//! Any transport-level failure (timeout, peer close, malformed header) moves
//! the session into a broken state. A broken session refuses further
//! requests until [`Session::reconnect`] is called, because the position in
//! the byte stream is no longer known.

use crate::core::types::{Address, CeError, CeResult, ModuleEntry, ProcessEntry, ProcessId, RegionInfo};
use crate::protocol::codec::{
    encode_bare, encode_request, trailing_len, CompressedReadHeader, HandleField,
    ModuleEntryHeader, ProcessEntryHeader, ReadMemoryHeader, ReadMemoryRequest, SnapshotRequest,
    VersionHeader, VirtualQueryRequest, VirtualQueryResponse,
};
use crate::protocol::command::snapshot_flags::TH32CS_SNAPMODULE;
use crate::protocol::command::Command;
use crate::protocol::transport::{Stream, Transport};
use crate::process::handle::{HandleKind, ProcessHandle, ServerHandle, SnapshotHandle};
use flate2::read::ZlibDecoder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::net::TcpStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Result of the version handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerVersion {
    pub version: i32,
    pub version_string: String,
}

/// Where and how to connect
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub io_timeout: Duration,
    /// Largest trailing payload accepted from the server
    pub max_payload: usize,
    /// zlib level requested for memory reads, 0 disables compression
    pub compression_level: u8,
}

impl ConnectOptions {
    /// Options with default timeouts and limits for `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ConnectOptions {
            host: host.into(),
            port,
            ..Default::default()
        }
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ConnectOptions {
            host: "127.0.0.1".to_string(),
            port: crate::core::DEFAULT_PORT,
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(5),
            max_payload: 16 * 1024 * 1024,
            compression_level: 0,
        }
    }
}

/// Lifecycle of a session's connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    /// A transport failure desynchronized the stream
    Broken,
    Closed,
}

/// One connection to ceserver
pub struct Session<S: Stream = TcpStream> {
    /// Unique per connection; a reconnect takes a fresh id
    id: u64,
    transport: Transport<S>,
    state: SessionState,
    handles: HashMap<u32, HandleKind>,
    compression_level: u8,
    server_version: Option<ServerVersion>,
    options: Option<ConnectOptions>,
}

impl Session<TcpStream> {
    /// Connects and performs the version handshake
    pub fn connect(options: ConnectOptions) -> CeResult<Self> {
        let transport = Transport::connect(
            &options.host,
            options.port,
            options.connect_timeout,
            options.io_timeout,
            options.max_payload,
        )?;
        let mut session = Session::with_transport(transport, options.compression_level);
        session.options = Some(options);
        session.get_version()?;
        Ok(session)
    }

    /// Drops the current connection (broken or not) and connects again.
    ///
    /// Handles issued on the old connection are forgotten.
    pub fn reconnect(&mut self) -> CeResult<()> {
        let options = self.options.clone().ok_or(CeError::NotConnected)?;
        self.disconnect();
        let fresh = Session::connect(options)?;
        *self = fresh;
        Ok(())
    }

    /// A handle that aborts in-flight I/O on this session from another thread
    pub fn canceller(&self) -> CeResult<Canceller> {
        Ok(Canceller {
            stream: self.transport.try_clone_stream()?,
        })
    }
}

impl<S: Stream> Session<S> {
    /// Wraps an already-connected stream; no handshake is performed
    pub fn from_stream(stream: S, peer: impl Into<String>, max_payload: usize) -> Self {
        Session::with_transport(Transport::new(stream, peer, max_payload), 0)
    }

    fn with_transport(transport: Transport<S>, compression_level: u8) -> Self {
        Session {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            transport,
            state: SessionState::Connected,
            handles: HashMap::new(),
            compression_level,
            server_version: None,
            options: None,
        }
    }

    /// Sets the zlib level used by [`read_memory`](Self::read_memory)
    pub fn set_compression_level(&mut self, level: u8) {
        self.compression_level = level.min(9);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Id stamped into every handle this connection issues
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Version reported by the last handshake
    pub fn server_version(&self) -> Option<&ServerVersion> {
        self.server_version.as_ref()
    }

    /// Number of handles issued on this session and not yet closed
    pub fn open_handle_count(&self) -> usize {
        self.handles.len()
    }

    /// Borrows the underlying stream while the session holds it
    pub fn get_ref(&self) -> Option<&S> {
        self.transport.get_ref()
    }

    /// Runs one exchange, poisoning the session on transport failure
    fn exchange<T>(
        &mut self,
        command: Command,
        f: impl FnOnce(&mut Transport<S>) -> CeResult<T>,
    ) -> CeResult<T> {
        match self.state {
            SessionState::Connected => {}
            SessionState::Broken => return Err(CeError::SessionBroken),
            SessionState::Closed => return Err(CeError::NotConnected),
        }
        let result = f(&mut self.transport);
        if let Err(e) = &result {
            if e.is_transport() {
                warn!(%command, error = %e, peer = %self.transport.peer(), "exchange failed, session broken");
                self.state = SessionState::Broken;
            }
        }
        result
    }

    fn check_handle<H: ServerHandle>(&self, handle: &H) -> CeResult<()> {
        if handle.session_id() != self.id {
            return Err(CeError::invalid_handle(format!(
                "{} handle 0x{:X} belongs to session {}, not {}",
                H::KIND,
                handle.raw(),
                handle.session_id(),
                self.id
            )));
        }
        match self.handles.get(&handle.raw()) {
            Some(kind) if *kind == H::KIND => Ok(()),
            Some(kind) => Err(CeError::invalid_handle(format!(
                "0x{:X} is a {} handle, expected {}",
                handle.raw(),
                kind,
                H::KIND
            ))),
            None => Err(CeError::invalid_handle(format!(
                "{} handle 0x{:X} was not issued by this session or is already closed",
                H::KIND,
                handle.raw()
            ))),
        }
    }

    /// CMD_GETVERSION
    pub fn get_version(&mut self) -> CeResult<ServerVersion> {
        let version = self.exchange(Command::GetVersion, |t| {
            t.send(&encode_bare(Command::GetVersion))?;
            let header: VersionHeader = t.recv_struct()?;
            let raw = t.recv_exact(header.string_size as usize)?;
            Ok(ServerVersion {
                version: header.version,
                version_string: String::from_utf8_lossy(&raw).into_owned(),
            })
        })?;
        debug!(version = version.version, name = %version.version_string, "server version");
        self.server_version = Some(version.clone());
        Ok(version)
    }

    /// CMD_OPENPROCESS.
    ///
    /// `Ok(None)` means the server could not open the process; pid 0 is
    /// never sent.
    pub fn open_process(&mut self, pid: ProcessId) -> CeResult<Option<ProcessHandle>> {
        if pid == 0 {
            return Ok(None);
        }
        let handle = self.exchange(Command::OpenProcess, |t| {
            t.send(&encode_request(Command::OpenProcess, &HandleField { value: pid }))?;
            Ok(t.recv_struct::<HandleField>()?.value)
        })?;
        if handle == 0 {
            debug!(pid, "server could not open process");
            return Ok(None);
        }
        debug!(pid, handle = format_args!("0x{:X}", handle), "process opened");
        self.handles.insert(handle, HandleKind::Process);
        Ok(Some(ProcessHandle::new(self.id, handle, pid)))
    }

    /// Creates a snapshot walked with first/next requests.
    ///
    /// Module snapshots go through CMD_CREATETOOLHELP32SNAPSHOT, the only
    /// variant that answers module flags with a handle; everything else
    /// uses CMD_CREATETOOLHELP32SNAPSHOTEX.
    pub fn create_snapshot(&mut self, flags: u32, pid: ProcessId) -> CeResult<SnapshotHandle> {
        let command = if flags & TH32CS_SNAPMODULE != 0 {
            Command::CreateToolhelp32Snapshot
        } else {
            Command::CreateToolhelp32SnapshotEx
        };
        let handle = self.exchange(command, |t| {
            t.send(&encode_request(command, &SnapshotRequest { flags, pid }))?;
            Ok(t.recv_struct::<HandleField>()?.value)
        })?;
        if handle == 0 {
            return Err(CeError::SnapshotFailed { flags, pid });
        }
        debug!(%command, flags = format_args!("0x{:X}", flags), pid, handle = format_args!("0x{:X}", handle), "snapshot created");
        self.handles.insert(handle, HandleKind::Snapshot);
        Ok(SnapshotHandle::new(self.id, handle, flags, pid))
    }

    /// CMD_CREATETOOLHELP32SNAPSHOTEX with module flags.
    ///
    /// The server streams every module entry back in one reply, terminated
    /// by an entry with `result == 0`; no handle is issued.
    pub fn stream_modules(&mut self, pid: ProcessId) -> CeResult<Vec<ModuleEntry>> {
        let command = Command::CreateToolhelp32SnapshotEx;
        let modules = self.exchange(command, |t| {
            t.send(&encode_request(
                command,
                &SnapshotRequest {
                    flags: TH32CS_SNAPMODULE,
                    pid,
                },
            ))?;
            let mut modules = Vec::new();
            while let Some(entry) = recv_module(t)? {
                modules.push(entry);
            }
            Ok(modules)
        })?;
        debug!(pid, count = modules.len(), "module list streamed");
        Ok(modules)
    }

    /// CMD_PROCESS32FIRST
    pub fn process_first(&mut self, snapshot: &SnapshotHandle) -> CeResult<Option<ProcessEntry>> {
        self.process_step(Command::Process32First, snapshot)
    }

    /// CMD_PROCESS32NEXT
    pub fn process_next(&mut self, snapshot: &SnapshotHandle) -> CeResult<Option<ProcessEntry>> {
        self.process_step(Command::Process32Next, snapshot)
    }

    fn process_step(
        &mut self,
        command: Command,
        snapshot: &SnapshotHandle,
    ) -> CeResult<Option<ProcessEntry>> {
        self.check_handle(snapshot)?;
        let raw = snapshot.raw();
        self.exchange(command, |t| {
            t.send(&encode_request(command, &HandleField { value: raw }))?;
            let header: ProcessEntryHeader = t.recv_struct()?;
            if header.result == 0 {
                return Ok(None);
            }
            let len = trailing_len("process name", header.name_size as i64, t.max_payload())?;
            let name = t.recv_exact(len)?;
            Ok(Some(ProcessEntry::new(
                header.pid as ProcessId,
                String::from_utf8_lossy(&name).into_owned(),
            )))
        })
    }

    /// CMD_MODULE32FIRST
    pub fn module_first(&mut self, snapshot: &SnapshotHandle) -> CeResult<Option<ModuleEntry>> {
        self.module_step(Command::Module32First, snapshot)
    }

    /// CMD_MODULE32NEXT
    pub fn module_next(&mut self, snapshot: &SnapshotHandle) -> CeResult<Option<ModuleEntry>> {
        self.module_step(Command::Module32Next, snapshot)
    }

    fn module_step(
        &mut self,
        command: Command,
        snapshot: &SnapshotHandle,
    ) -> CeResult<Option<ModuleEntry>> {
        self.check_handle(snapshot)?;
        let raw = snapshot.raw();
        self.exchange(command, |t| {
            t.send(&encode_request(command, &HandleField { value: raw }))?;
            recv_module(t)
        })
    }

    /// CMD_CLOSEHANDLE; consumes the handle
    pub fn close_handle<H: ServerHandle>(&mut self, handle: H) -> CeResult<()> {
        self.check_handle(&handle)?;
        let raw = handle.raw();
        // forgotten up front: after a failed exchange the server side is
        // unreachable through this connection anyway
        self.handles.remove(&raw);
        self.exchange(Command::CloseHandle, |t| {
            t.send(&encode_request(Command::CloseHandle, &HandleField { value: raw }))?;
            t.recv_struct::<HandleField>()?;
            Ok(())
        })?;
        debug!(kind = %H::KIND, handle = format_args!("0x{:X}", raw), "handle closed");
        Ok(())
    }

    /// CMD_READPROCESSMEMORY.
    ///
    /// `Ok(None)` when the server read nothing. With `compress > 0` the
    /// server deflates the data at that zlib level and it is inflated here,
    /// so callers see the same bytes either way.
    pub fn read_process_memory(
        &mut self,
        process: &ProcessHandle,
        address: u64,
        size: u32,
        compress: u8,
    ) -> CeResult<Option<Vec<u8>>> {
        self.check_handle(process)?;
        let request = ReadMemoryRequest {
            handle: process.raw(),
            address,
            size,
            compress: compress.min(9),
        };
        self.exchange(Command::ReadProcessMemory, |t| {
            t.send(&encode_request(Command::ReadProcessMemory, &request))?;
            if request.compress == 0 {
                let header: ReadMemoryHeader = t.recv_struct()?;
                if header.read == 0 {
                    return Ok(None);
                }
                if header.read > size {
                    return Err(CeError::malformed(format!(
                        "server returned {} bytes for a {} byte read",
                        header.read, size
                    )));
                }
                return t.recv_exact(header.read as usize).map(Some);
            }

            let header: CompressedReadHeader = t.recv_struct()?;
            if header.uncompressed_size > size {
                return Err(CeError::malformed(format!(
                    "server announced {} bytes for a {} byte read",
                    header.uncompressed_size, size
                )));
            }
            let compressed = t.recv_exact(header.compressed_size as usize)?;
            if header.uncompressed_size == 0 {
                return Ok(None);
            }
            inflate(&compressed, header.uncompressed_size as usize).map(Some)
        })
    }

    /// Reads with the session's compression level
    pub fn read_memory(
        &mut self,
        process: &ProcessHandle,
        address: u64,
        size: u32,
    ) -> CeResult<Option<Vec<u8>>> {
        let level = self.compression_level;
        self.read_process_memory(process, address, size, level)
    }

    /// CMD_VIRTUALQUERYEX; `Ok(None)` when nothing is mapped at or after `address`
    pub fn virtual_query_ex(
        &mut self,
        process: &ProcessHandle,
        address: u64,
    ) -> CeResult<Option<RegionInfo>> {
        self.check_handle(process)?;
        let request = VirtualQueryRequest {
            handle: process.raw(),
            address,
        };
        let response = self.exchange(Command::VirtualQueryEx, |t| {
            t.send(&encode_request(Command::VirtualQueryEx, &request))?;
            t.recv_struct::<VirtualQueryResponse>()
        })?;
        if response.result == 0 {
            return Ok(None);
        }
        Ok(Some(RegionInfo {
            base_address: Address::new(response.base_address),
            size: response.size,
            protection: response.protection,
            region_type: response.region_type,
        }))
    }

    /// Shuts the stream down so blocked I/O on clones of it fails
    pub fn shutdown(&self) -> CeResult<()> {
        self.transport.shutdown()
    }

    /// Sends CMD_CLOSECONNECTION when possible and releases the stream.
    ///
    /// Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if !self.handles.is_empty() {
            warn!(count = self.handles.len(), peer = %self.transport.peer(), "disconnecting with open handles");
            self.handles.clear();
        }
        if self.state == SessionState::Connected {
            if let Err(e) = self.transport.send(&encode_bare(Command::CloseConnection)) {
                debug!(error = %e, "close-connection not delivered");
            }
        }
        self.transport.close();
        self.state = SessionState::Closed;
    }
}

impl<S: Stream> Drop for Session<S> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// One module entry header plus its name; `None` on the terminating entry
fn recv_module<S: Stream>(t: &mut Transport<S>) -> CeResult<Option<ModuleEntry>> {
    let header: ModuleEntryHeader = t.recv_struct()?;
    if header.result == 0 {
        return Ok(None);
    }
    let len = trailing_len("module name", header.name_size as i64, t.max_payload())?;
    let name = t.recv_exact(len)?;
    Ok(Some(ModuleEntry {
        base_address: Address::new(header.base as u64),
        part: header.part,
        size: header.size as u32,
        file_offset: header.file_offset,
        name: String::from_utf8_lossy(&name).into_owned(),
    }))
}

fn inflate(compressed: &[u8], expected: usize) -> CeResult<Vec<u8>> {
    let mut out = Vec::with_capacity(expected);
    ZlibDecoder::new(compressed)
        .take(expected as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| CeError::Decompression(e.to_string()))?;
    if out.len() != expected {
        return Err(CeError::Decompression(format!(
            "inflated to {} bytes, header announced {}",
            out.len(),
            expected
        )));
    }
    Ok(out)
}

/// Aborts blocked I/O of a TCP session from another thread
pub struct Canceller {
    stream: TcpStream,
}

impl Canceller {
    /// Shuts the socket down; the session's pending call fails and the session breaks
    pub fn cancel(&self) -> CeResult<()> {
        self.stream.shutdown(std::net::Shutdown::Both)?;
        Ok(())
    }
}

/// A session shared between threads, one exchange at a time
pub struct SharedSession<S: Stream = TcpStream> {
    inner: Arc<Mutex<Session<S>>>,
}

impl<S: Stream> Clone for SharedSession<S> {
    fn clone(&self) -> Self {
        SharedSession {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Stream> SharedSession<S> {
    pub fn new(session: Session<S>) -> Self {
        SharedSession {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Locks the session for a sequence of exchanges
    pub fn lock(&self) -> MutexGuard<'_, Session<S>> {
        // a panic mid-exchange poisons the lock; the session state itself
        // still says whether the stream is usable
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `f` with exclusive access to the session
    pub fn with<T>(&self, f: impl FnOnce(&mut Session<S>) -> T) -> T {
        f(&mut self.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::WireStruct;
    use std::io::{self, Write};

    /// Replays a fixed response script and records requests
    struct Scripted {
        input: io::Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl Scripted {
        fn new(input: Vec<u8>) -> Self {
            Scripted {
                input: io::Cursor::new(input),
                written: Vec::new(),
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Stream for Scripted {}

    fn session(input: Vec<u8>) -> Session<Scripted> {
        Session::from_stream(Scripted::new(input), "scripted", 4096)
    }

    fn remaining(session: &Session<Scripted>) -> usize {
        let stream = session.get_ref().unwrap();
        stream.input.get_ref().len() - stream.input.position() as usize
    }

    #[test]
    fn test_handshake() {
        let mut s = session(b"\x00\x00\x00\x05\x04MOCK".to_vec());
        let version = s.get_version().unwrap();
        assert_eq!(version.version, 5);
        assert_eq!(version.version_string, "MOCK");
        assert_eq!(s.server_version(), Some(&version));
    }

    #[test]
    fn test_open_process_zero_handle_is_recoverable() {
        let mut s = session(vec![0, 0, 0, 0]);
        assert!(s.open_process(1234).unwrap().is_none());
        assert_eq!(s.state(), SessionState::Connected);
        assert_eq!(s.open_handle_count(), 0);
    }

    #[test]
    fn test_open_process_pid_zero_sends_nothing() {
        let mut s = session(vec![]);
        assert!(s.open_process(0).unwrap().is_none());
        assert!(s.get_ref().unwrap().written.is_empty());
    }

    #[test]
    fn test_read_of_unreadable_memory() {
        // handle 0x10, then a zero-length read followed by unrelated bytes
        let mut s = session(vec![0x10, 0, 0, 0, 0, 0, 0, 0, 0xAA, 0xBB]);
        let process = s.open_process(42).unwrap().unwrap();
        assert_eq!(s.read_process_memory(&process, 0x1000, 4, 0).unwrap(), None);
        assert_eq!(remaining(&s), 2);
    }

    #[test]
    fn test_compressed_read_is_transparent() {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;

        let payload = 0xDEADBEEFu32.to_le_bytes();
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(6));
        encoder.write_all(&payload).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut script = vec![0x10, 0, 0, 0];
        script.extend_from_slice(
            &CompressedReadHeader {
                uncompressed_size: 4,
                compressed_size: compressed.len() as u32,
            }
            .encode(),
        );
        script.extend_from_slice(&compressed);

        let mut s = session(script);
        let process = s.open_process(42).unwrap().unwrap();
        let bytes = s.read_process_memory(&process, 0x1000, 4, 6).unwrap();
        assert_eq!(bytes, Some(payload.to_vec()));
        assert_eq!(remaining(&s), 0);
    }

    #[test]
    fn test_closed_handle_is_rejected_without_io() {
        let mut s = session(vec![0x10, 0, 0, 0, 1, 0, 0, 0]);
        let process = s.open_process(42).unwrap().unwrap();
        let stale = ProcessHandle::new(s.id(), process.raw(), 42);
        s.close_handle(process).unwrap();

        let written_before = s.get_ref().unwrap().written.len();
        let err = s.read_process_memory(&stale, 0x1000, 4, 0).unwrap_err();
        assert!(matches!(err, CeError::InvalidHandle(_)));
        assert_eq!(
            s.get_ref().unwrap().written.len(),
            written_before
        );
    }

    #[test]
    fn test_handle_from_another_session_is_rejected_without_io() {
        let mut first = session(vec![0x10, 0, 0, 0]);
        let mut second = session(vec![0x10, 0, 0, 0]);
        let _own = first.open_process(42).unwrap().unwrap();
        let foreign = second.open_process(42).unwrap().unwrap();
        assert_ne!(first.id(), second.id());

        let written_before = first.get_ref().unwrap().written.len();
        let err = first.read_process_memory(&foreign, 0x1000, 4, 0).unwrap_err();
        assert!(matches!(err, CeError::InvalidHandle(_)));
        assert_eq!(first.get_ref().unwrap().written.len(), written_before);
        assert_eq!(first.state(), SessionState::Connected);
    }

    #[test]
    fn test_handle_kind_mismatch() {
        let mut s = session(vec![0x10, 0, 0, 0]);
        let process = s.open_process(42).unwrap().unwrap();
        let as_snapshot = SnapshotHandle::new(s.id(), process.raw(), 2, 0);
        assert!(matches!(
            s.process_first(&as_snapshot),
            Err(CeError::InvalidHandle(_))
        ));
    }

    #[test]
    fn test_short_response_breaks_session() {
        let mut s = session(vec![0x00, 0x00]);
        assert!(matches!(
            s.get_version(),
            Err(CeError::ConnectionClosed { .. })
        ));
        assert_eq!(s.state(), SessionState::Broken);
        assert!(matches!(s.get_version(), Err(CeError::SessionBroken)));
    }

    #[test]
    fn test_negative_name_size_is_malformed() {
        let mut script = vec![0x33, 0, 0, 0];
        script.extend_from_slice(
            &ProcessEntryHeader {
                result: 1,
                pid: 1,
                name_size: -4,
            }
            .encode(),
        );
        let mut s = session(script);
        let snapshot = s.create_snapshot(2, 0).unwrap();
        assert!(matches!(
            s.process_first(&snapshot),
            Err(CeError::MalformedResponse(_))
        ));
        assert_eq!(s.state(), SessionState::Broken);
    }

    #[test]
    fn test_module_snapshot_uses_handle_command() {
        let mut s = session(vec![0x40, 0, 0, 0, 0x41, 0, 0, 0]);
        let modules = s.create_snapshot(TH32CS_SNAPMODULE, 77).unwrap();
        let processes = s.create_snapshot(2, 0).unwrap();
        assert_eq!(modules.raw(), 0x40);
        assert_eq!(processes.raw(), 0x41);

        let written = &s.get_ref().unwrap().written;
        assert_eq!(written[0], Command::CreateToolhelp32Snapshot.id());
        assert_eq!(written[9], Command::CreateToolhelp32SnapshotEx.id());
    }

    #[test]
    fn test_streamed_module_list_ends_at_terminator() {
        let mut script = Vec::new();
        for (base, name) in [(0x1000i64, "/bin/a"), (0x2000, "/lib/b.so")] {
            script.extend_from_slice(
                &ModuleEntryHeader {
                    result: 1,
                    base,
                    part: 0,
                    size: 0x100,
                    file_offset: 0,
                    name_size: name.len() as i32,
                }
                .encode(),
            );
            script.extend_from_slice(name.as_bytes());
        }
        script.extend_from_slice(&[0u8; 28]);
        script.extend_from_slice(&[0xEE]);

        let mut s = session(script);
        let modules = s.stream_modules(77).unwrap();
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[1].basename(), "b.so");
        assert_eq!(modules[1].base_address, Address::new(0x2000));
        assert_eq!(remaining(&s), 1);
        assert_eq!(s.open_handle_count(), 0);
        assert_eq!(
            s.get_ref().unwrap().written,
            b"\x23\x08\x00\x00\x00\x4d\x00\x00\x00".to_vec()
        );
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut s = session(vec![]);
        s.disconnect();
        s.disconnect();
        assert_eq!(s.state(), SessionState::Closed);
        assert!(matches!(s.get_version(), Err(CeError::NotConnected)));
    }

    #[test]
    fn test_inflate_length_mismatch() {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(&[1, 2, 3]).unwrap();
        let compressed = encoder.finish().unwrap();
        assert!(matches!(
            inflate(&compressed, 4),
            Err(CeError::Decompression(_))
        ));
        assert_eq!(inflate(&compressed, 3).unwrap(), vec![1, 2, 3]);
    }
}
