//! ceserver wire protocol
//!
//! Layered bottom-up: command identifiers, fixed-layout struct codecs,
//! exact-length framing over a stream, and the per-command session
//! exchanges built on top of them.

pub mod codec;
pub mod command;
pub mod session;
pub mod transport;

pub use codec::{ByteOrder, WireStruct};
pub use command::{snapshot_flags, Command};
pub use session::{
    Canceller, ConnectOptions, ServerVersion, Session, SessionState, SharedSession,
};
pub use transport::{Stream, Transport};
