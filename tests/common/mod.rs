//! In-process ceserver double for integration tests
//!
//! `MockServer` speaks the wire protocol over a real TCP socket, answers from
//! a small model (process list, modules, sparse memory) and records every
//! command byte and every closed handle. Responses are encoded by hand here
//! so the tests do not share the client's codec.

#![allow(dead_code)]

use ceserver_client::protocol::Stream;
use ceserver_client::ConnectOptions;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Clone)]
pub struct MockModule {
    pub base: u64,
    pub size: u32,
    pub name: String,
}

#[derive(Clone)]
pub struct MockRegion {
    pub base: u64,
    pub size: u64,
    pub protection: u32,
    pub region_type: u32,
}

enum Cursor {
    Processes { pos: usize },
    Modules { pid: u32, pos: usize },
}

#[derive(Default)]
pub struct MockState {
    pub version: i32,
    pub version_string: String,
    pub processes: Vec<(u32, String)>,
    pub modules: HashMap<u32, Vec<MockModule>>,
    pub memory: BTreeMap<u64, u8>,
    pub regions: Vec<MockRegion>,
    /// pids the server refuses to open
    pub refuse: HashSet<u32>,
    /// Stop answering after this many commands on a connection
    pub hang_after: Option<usize>,

    next_handle: u32,
    process_handles: HashSet<u32>,
    snapshots: HashMap<u32, Cursor>,
    pub commands: Vec<u8>,
    pub closed: Vec<u32>,
    pub snapshots_created: usize,
    pub streamed_module_lists: usize,
    pub connections: usize,
}

impl MockState {
    pub fn new() -> Self {
        MockState {
            version: 5,
            version_string: "MOCK".to_string(),
            next_handle: 0x100,
            ..Default::default()
        }
    }

    pub fn process(mut self, pid: u32, name: &str) -> Self {
        self.processes.push((pid, name.to_string()));
        self
    }

    pub fn module(mut self, pid: u32, name: &str, base: u64, size: u32) -> Self {
        self.modules.entry(pid).or_default().push(MockModule {
            base,
            size,
            name: name.to_string(),
        });
        self
    }

    pub fn bytes(mut self, address: u64, data: &[u8]) -> Self {
        for (i, b) in data.iter().enumerate() {
            self.memory.insert(address + i as u64, *b);
        }
        self
    }

    pub fn pointer(self, address: u64, value: u64) -> Self {
        self.bytes(address, &value.to_le_bytes())
    }

    pub fn region(mut self, base: u64, size: u64, protection: u32) -> Self {
        self.regions.push(MockRegion {
            base,
            size,
            protection,
            region_type: 0x20000,
        });
        self
    }

    pub fn refuse(mut self, pid: u32) -> Self {
        self.refuse.insert(pid);
        self
    }

    fn allocate(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    /// Handle for a process or module cursor, 0 for unsupported flags
    fn open_snapshot(&mut self, flags: u32, pid: u32) -> u32 {
        let cursor = if flags & 0x8 != 0 {
            Cursor::Modules { pid, pos: 0 }
        } else if flags & 0x2 != 0 {
            Cursor::Processes { pos: 0 }
        } else {
            return 0;
        };
        let handle = self.allocate();
        self.snapshots.insert(handle, cursor);
        self.snapshots_created += 1;
        handle
    }

    fn readable(&self, address: u64, size: u32) -> Vec<u8> {
        (0..size as u64)
            .map_while(|i| self.memory.get(&(address + i)).copied())
            .collect()
    }
}

pub struct MockServer {
    pub port: u16,
    pub state: Arc<Mutex<MockState>>,
}

impl MockServer {
    pub fn start(state: MockState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(state));
        let shared = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let state = Arc::clone(&shared);
                thread::spawn(move || {
                    state.lock().unwrap().connections += 1;
                    let _ = serve(stream, state);
                });
            }
        });
        MockServer { port, state }
    }

    pub fn options(&self) -> ConnectOptions {
        ConnectOptions {
            io_timeout: Duration::from_secs(2),
            ..ConnectOptions::new("127.0.0.1", self.port)
        }
    }

    pub fn commands(&self) -> Vec<u8> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn count(&self, command: u8) -> usize {
        self.commands().iter().filter(|&&c| c == command).count()
    }

    pub fn closed(&self) -> Vec<u32> {
        self.state.lock().unwrap().closed.clone()
    }

    pub fn snapshots_created(&self) -> usize {
        self.state.lock().unwrap().snapshots_created
    }

    pub fn streamed_module_lists(&self) -> usize {
        self.state.lock().unwrap().streamed_module_lists
    }
}

fn read_u8(s: &mut TcpStream) -> io::Result<u8> {
    let mut b = [0u8; 1];
    s.read_exact(&mut b)?;
    Ok(b[0])
}

fn read_u32(s: &mut TcpStream) -> io::Result<u32> {
    let mut b = [0u8; 4];
    s.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

fn read_u64(s: &mut TcpStream) -> io::Result<u64> {
    let mut b = [0u8; 8];
    s.read_exact(&mut b)?;
    Ok(u64::from_le_bytes(b))
}

fn module_entry(m: &MockModule) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&1i32.to_le_bytes());
    out.extend_from_slice(&(m.base as i64).to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&(m.size as i32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(m.name.len() as i32).to_le_bytes());
    out.extend_from_slice(m.name.as_bytes());
    out
}

fn serve(mut s: TcpStream, state: Arc<Mutex<MockState>>) -> io::Result<()> {
    let mut handled = 0usize;
    loop {
        let command = read_u8(&mut s)?;
        let hang_after = {
            let mut st = state.lock().unwrap();
            st.commands.push(command);
            st.hang_after
        };
        if hang_after.is_some_and(|n| handled >= n) {
            // swallow the request and never answer
            thread::sleep(Duration::from_secs(30));
            return Ok(());
        }
        handled += 1;

        let mut out = Vec::new();
        match command {
            0 => {
                let st = state.lock().unwrap();
                out.extend_from_slice(&st.version.to_be_bytes());
                out.push(st.version_string.len() as u8);
                out.extend_from_slice(st.version_string.as_bytes());
            }
            1 => return Ok(()),
            3 => {
                let pid = read_u32(&mut s)?;
                let mut st = state.lock().unwrap();
                let known = st.processes.iter().any(|(p, _)| *p == pid);
                let handle = if known && !st.refuse.contains(&pid) {
                    let h = st.allocate();
                    st.process_handles.insert(h);
                    h
                } else {
                    0
                };
                out.extend_from_slice(&handle.to_le_bytes());
            }
            4 => {
                let flags = read_u32(&mut s)?;
                let pid = read_u32(&mut s)?;
                let mut st = state.lock().unwrap();
                let handle = st.open_snapshot(flags, pid);
                out.extend_from_slice(&handle.to_le_bytes());
            }
            0x23 => {
                let flags = read_u32(&mut s)?;
                let pid = read_u32(&mut s)?;
                let mut st = state.lock().unwrap();
                if flags & 0x8 != 0 {
                    // module lists are streamed back without a handle,
                    // ending with a result == 0 entry
                    st.streamed_module_lists += 1;
                    for m in st.modules.get(&pid).cloned().unwrap_or_default() {
                        out.extend_from_slice(&module_entry(&m));
                    }
                    out.extend_from_slice(&[0u8; 28]);
                } else {
                    let handle = st.open_snapshot(flags, pid);
                    out.extend_from_slice(&handle.to_le_bytes());
                }
            }
            5 | 6 => {
                let handle = read_u32(&mut s)?;
                let mut st = state.lock().unwrap();
                let processes = st.processes.clone();
                let entry = match st.snapshots.get_mut(&handle) {
                    Some(Cursor::Processes { pos }) => {
                        if command == 5 {
                            *pos = 0;
                        }
                        let entry = processes.get(*pos).cloned();
                        *pos += 1;
                        entry
                    }
                    _ => None,
                };
                match entry {
                    Some((pid, name)) => {
                        out.extend_from_slice(&1i32.to_le_bytes());
                        out.extend_from_slice(&(pid as i32).to_le_bytes());
                        out.extend_from_slice(&(name.len() as i32).to_le_bytes());
                        out.extend_from_slice(name.as_bytes());
                    }
                    None => out.extend_from_slice(&[0u8; 12]),
                }
            }
            22 | 23 => {
                let handle = read_u32(&mut s)?;
                let mut st = state.lock().unwrap();
                let modules = st.modules.clone();
                let entry = match st.snapshots.get_mut(&handle) {
                    Some(Cursor::Modules { pid, pos }) => {
                        if command == 22 {
                            *pos = 0;
                        }
                        let entry = modules.get(pid).and_then(|m| m.get(*pos)).cloned();
                        *pos += 1;
                        entry
                    }
                    _ => None,
                };
                match entry {
                    Some(m) => out.extend_from_slice(&module_entry(&m)),
                    None => out.extend_from_slice(&[0u8; 28]),
                }
            }
            7 => {
                let handle = read_u32(&mut s)?;
                let mut st = state.lock().unwrap();
                let known =
                    st.process_handles.remove(&handle) | st.snapshots.remove(&handle).is_some();
                st.closed.push(handle);
                out.extend_from_slice(&(known as u32).to_le_bytes());
            }
            8 => {
                let handle = read_u32(&mut s)?;
                let address = read_u64(&mut s)?;
                let st = state.lock().unwrap();
                let region = st
                    .process_handles
                    .contains(&handle)
                    .then(|| {
                        st.regions
                            .iter()
                            .filter(|r| r.base + r.size > address)
                            .min_by_key(|r| r.base)
                            .cloned()
                    })
                    .flatten();
                match region {
                    Some(r) => {
                        out.push(1);
                        out.extend_from_slice(&r.protection.to_le_bytes());
                        out.extend_from_slice(&r.region_type.to_le_bytes());
                        out.extend_from_slice(&r.base.to_le_bytes());
                        out.extend_from_slice(&r.size.to_le_bytes());
                    }
                    None => out.extend_from_slice(&[0u8; 25]),
                }
            }
            9 => {
                let handle = read_u32(&mut s)?;
                let address = read_u64(&mut s)?;
                let size = read_u32(&mut s)?;
                let compress = read_u8(&mut s)?;
                let st = state.lock().unwrap();
                let data = if st.process_handles.contains(&handle) {
                    st.readable(address, size)
                } else {
                    Vec::new()
                };
                if compress == 0 {
                    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
                    out.extend_from_slice(&data);
                } else {
                    let mut encoder =
                        ZlibEncoder::new(Vec::new(), Compression::new(compress as u32));
                    encoder.write_all(&data)?;
                    let compressed = encoder.finish()?;
                    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
                    out.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
                    out.extend_from_slice(&compressed);
                }
            }
            _ => return Ok(()),
        }
        s.write_all(&out)?;
    }
}

/// Replays a fixed byte script in chunks and records what the client wrote
pub struct ScriptedStream {
    pub input: Vec<u8>,
    pub position: usize,
    pub chunk: usize,
    pub written: Vec<u8>,
}

impl ScriptedStream {
    pub fn new(input: Vec<u8>) -> Self {
        ScriptedStream {
            input,
            position: 0,
            chunk: usize::MAX,
            written: Vec::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.input.len() - self.position
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.chunk).min(self.remaining());
        buf[..n].copy_from_slice(&self.input[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Stream for ScriptedStream {}
