//! Exact-length framing over a byte stream
//!
//! The protocol has no delimiters: every response is a fixed header whose
//! fields announce how many trailing bytes follow. A short read would shift
//! every later parse, so all receives in the crate go through
//! [`Transport::recv_exact`].

use crate::core::types::{CeError, CeResult};
use crate::protocol::codec::WireStruct;
use crate::protocol::command::Command;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, trace};

/// A duplex byte stream the transport can run over
pub trait Stream: Read + Write {
    /// Aborts blocked reads and writes on every clone of the stream
    fn shutdown(&self) -> io::Result<()> {
        Ok(())
    }
}

impl Stream for TcpStream {
    fn shutdown(&self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

impl<S: Stream + ?Sized> Stream for Box<S> {
    fn shutdown(&self) -> io::Result<()> {
        (**self).shutdown()
    }
}

/// One connection's framing state
pub struct Transport<S> {
    stream: Option<S>,
    peer: String,
    max_payload: usize,
}

impl Transport<TcpStream> {
    /// Opens a TCP connection with connect and per-operation I/O timeouts
    pub fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        io_timeout: Duration,
        max_payload: usize,
    ) -> CeResult<Self> {
        let endpoint = format!("{}:{}", host, port);
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|e| CeError::connection(&endpoint, e.to_string()))?
            .collect();

        let mut last_error = String::from("no addresses resolved");
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, connect_timeout) {
                Ok(stream) => {
                    configure(&stream, io_timeout)
                        .map_err(|e| CeError::connection(&endpoint, e.to_string()))?;
                    debug!(peer = %addr, "connected to ceserver");
                    return Ok(Transport::new(stream, endpoint, max_payload));
                }
                Err(e) => {
                    debug!(peer = %addr, error = %e, "connect attempt failed");
                    last_error = e.to_string();
                }
            }
        }
        Err(CeError::connection(endpoint, last_error))
    }

    /// A second handle on the socket that can abort in-flight I/O from another thread
    pub fn try_clone_stream(&self) -> CeResult<TcpStream> {
        Ok(self.stream()?.try_clone()?)
    }
}

impl<S: Stream> Transport<S> {
    /// Wraps an already-connected stream
    pub fn new(stream: S, peer: impl Into<String>, max_payload: usize) -> Self {
        Transport {
            stream: Some(stream),
            peer: peer.into(),
            max_payload,
        }
    }

    /// Peer description used in logs and errors
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Upper bound on any single trailing payload
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Whether the stream is still held
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Borrows the underlying stream, if still open
    pub fn get_ref(&self) -> Option<&S> {
        self.stream.as_ref()
    }

    fn stream(&self) -> CeResult<&S> {
        self.stream.as_ref().ok_or(CeError::NotConnected)
    }

    fn stream_mut(&mut self) -> CeResult<&mut S> {
        self.stream.as_mut().ok_or(CeError::NotConnected)
    }

    /// Writes the whole buffer
    pub fn send(&mut self, bytes: &[u8]) -> CeResult<()> {
        trace!(command = %frame_command(bytes), len = bytes.len(), frame = %hex::encode(bytes), "send");
        let stream = self.stream_mut()?;
        let mut written = 0;
        while written < bytes.len() {
            match stream.write(&bytes[written..]) {
                Ok(0) => return Err(CeError::closed(bytes.len(), written)),
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if is_timeout(&e) => {
                    return Err(CeError::Timeout(format!(
                        "write of {} bytes ({} sent)",
                        bytes.len(),
                        written
                    )))
                }
                Err(e) => return Err(CeError::Io(e)),
            }
        }
        stream.flush()?;
        Ok(())
    }

    /// Receives exactly `n` bytes, looping over partial reads.
    ///
    /// Fails with `Timeout` when a read waits past the socket timeout and
    /// with `ConnectionClosed` when the peer hangs up before `n` bytes.
    pub fn recv_exact(&mut self, n: usize) -> CeResult<Vec<u8>> {
        if n > self.max_payload {
            return Err(CeError::malformed(format!(
                "announced payload of {} bytes exceeds the {} byte limit",
                n, self.max_payload
            )));
        }

        let stream = self.stream_mut()?;
        let mut buf = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            match stream.read(&mut buf[filled..]) {
                Ok(0) => return Err(CeError::closed(n, filled)),
                Ok(read) => filled += read,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if is_timeout(&e) => {
                    return Err(CeError::Timeout(format!(
                        "{} of {} bytes received",
                        filled, n
                    )))
                }
                Err(e) => return Err(CeError::Io(e)),
            }
        }
        trace!(len = n, frame = %hex::encode(&buf), "recv");
        Ok(buf)
    }

    /// Receives and decodes one fixed-layout struct
    pub fn recv_struct<T: WireStruct>(&mut self) -> CeResult<T> {
        let bytes = self.recv_exact(T::SIZE)?;
        T::decode(&bytes)
    }

    /// Shuts the stream down without consuming the transport
    pub fn shutdown(&self) -> CeResult<()> {
        if let Some(stream) = &self.stream {
            stream.shutdown()?;
        }
        Ok(())
    }

    /// Releases the stream; later calls are no-ops
    pub fn close(&mut self) -> Option<S> {
        let stream = self.stream.take();
        if let Some(s) = &stream {
            let _ = s.shutdown();
            debug!(peer = %self.peer, "transport closed");
        }
        stream
    }
}

fn configure(stream: &TcpStream, io_timeout: Duration) -> io::Result<()> {
    stream.set_read_timeout(Some(io_timeout))?;
    stream.set_write_timeout(Some(io_timeout))?;
    stream.set_nodelay(true)
}

/// Names the command byte that opens a request frame
fn frame_command(bytes: &[u8]) -> String {
    match bytes.first() {
        Some(&id) => match Command::from_id(id) {
            Some(command) => command.to_string(),
            None => format!("unknown({})", id),
        },
        None => String::from("empty"),
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
