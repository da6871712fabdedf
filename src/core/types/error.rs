//! Error types for the ceserver client

use std::fmt;
use thiserror::Error;

/// Main error type for protocol and memory operations
#[derive(Error, Debug)]
pub enum CeError {
    #[error("Connection to {endpoint} failed: {reason}")]
    ConnectionError { endpoint: String, reason: String },

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Connection closed by peer after {received} of {expected} bytes")]
    ConnectionClosed { expected: usize, received: usize },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Session is not connected")]
    NotConnected,

    #[error("Session is broken by an earlier transport failure; reconnect required")]
    SessionBroken,

    #[error("Snapshot could not be created (flags 0x{flags:X}, pid {pid})")]
    SnapshotFailed { flags: u32, pid: u32 },

    #[error("Decompression failed: {0}")]
    Decompression(String),

    #[error("Invalid memory address: {0}")]
    InvalidAddress(String),

    #[error("Invalid value type: {0}")]
    InvalidValueType(String),

    #[error("Invalid pointer chain: {0}")]
    InvalidPointerChain(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Result type alias for client operations
pub type CeResult<T> = Result<T, CeError>;

impl CeError {
    /// Creates a connection error for an endpoint
    pub fn connection(endpoint: impl fmt::Display, reason: impl Into<String>) -> Self {
        CeError::ConnectionError {
            endpoint: endpoint.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a malformed response error
    pub fn malformed(reason: impl Into<String>) -> Self {
        CeError::MalformedResponse(reason.into())
    }

    /// Creates an invalid handle error
    pub fn invalid_handle(reason: impl Into<String>) -> Self {
        CeError::InvalidHandle(reason.into())
    }

    /// Creates a short-read error
    pub fn closed(expected: usize, received: usize) -> Self {
        CeError::ConnectionClosed { expected, received }
    }

    /// True for failures that leave the byte stream in an unknown position.
    ///
    /// Such errors poison the session: continuing to parse would desynchronize
    /// every later exchange.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            CeError::ConnectionError { .. }
                | CeError::Timeout(_)
                | CeError::ConnectionClosed { .. }
                | CeError::MalformedResponse(_)
                | CeError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CeError::connection("127.0.0.1:52736", "refused");
        assert_eq!(
            err.to_string(),
            "Connection to 127.0.0.1:52736 failed: refused"
        );

        let err = CeError::closed(12, 5);
        assert_eq!(
            err.to_string(),
            "Connection closed by peer after 5 of 12 bytes"
        );
    }

    #[test]
    fn test_all_error_variants() {
        let errors: Vec<(CeError, &str)> = vec![
            (
                CeError::Timeout("version header".to_string()),
                "Timed out waiting for version header",
            ),
            (
                CeError::malformed("short header"),
                "Malformed response: short header",
            ),
            (
                CeError::invalid_handle("0x7 already closed"),
                "Invalid handle: 0x7 already closed",
            ),
            (CeError::NotConnected, "Session is not connected"),
            (
                CeError::SessionBroken,
                "Session is broken by an earlier transport failure; reconnect required",
            ),
            (
                CeError::SnapshotFailed { flags: 2, pid: 0 },
                "Snapshot could not be created (flags 0x2, pid 0)",
            ),
            (
                CeError::Decompression("bad stream".to_string()),
                "Decompression failed: bad stream",
            ),
            (
                CeError::InvalidPointerChain("empty".to_string()),
                "Invalid pointer chain: empty",
            ),
        ];

        for (error, expected) in errors {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_transport_classification() {
        assert!(CeError::Timeout("x".into()).is_transport());
        assert!(CeError::closed(4, 0).is_transport());
        assert!(CeError::malformed("x").is_transport());
        assert!(!CeError::invalid_handle("x").is_transport());
        assert!(!CeError::NotConnected.is_transport());
        assert!(!CeError::SnapshotFailed { flags: 2, pid: 0 }.is_transport());
        // the compressed payload was fully consumed, so the stream is still in step
        assert!(!CeError::Decompression("x".into()).is_transport());
    }

    #[test]
    fn test_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: CeError = io_err.into();
        assert!(matches!(err, CeError::Io(_)));
    }
}
