//! Typed reads over any raw memory source
//!
//! Everything here is little-endian and built on a single primitive,
//! [`MemorySource::read_bytes`]. Memory the target cannot serve comes back
//! as `Ok(None)`; only transport and protocol failures are errors.

use crate::core::types::{Address, CeResult, MemoryValue, ValueType};
use crate::protocol::session::Session;
use crate::protocol::transport::Stream;
use crate::process::handle::ProcessHandle;
use tracing::trace;

/// Smallest value treated as a dereferenceable pointer.
///
/// The low 64 KiB are never mapped in user space, so anything below is a
/// null or a small integer rather than an address.
pub const MIN_POINTER: u64 = 0x10000;

/// Read length for [`ValueType::Bytes`] and [`ValueType::String`] in [`MemorySource::read_value`]
pub const DEFAULT_VARIABLE_LENGTH: u32 = 64;

macro_rules! typed_read {
    ($($name:ident => $ty:ty),* $(,)?) => {
        $(
            #[doc = concat!("Reads a little-endian `", stringify!($ty), "`")]
            fn $name(&mut self, address: Address) -> CeResult<Option<$ty>> {
                Ok(self
                    .read_bytes(address, std::mem::size_of::<$ty>() as u32)?
                    .and_then(|bytes| bytes.try_into().ok())
                    .map(<$ty>::from_le_bytes))
            }
        )*
    };
}

/// A place remote memory can be read from
pub trait MemorySource {
    /// Reads up to `size` bytes at `address`; `None` when nothing was readable
    fn read_bytes(&mut self, address: Address, size: u32) -> CeResult<Option<Vec<u8>>>;

    typed_read! {
        read_u8 => u8,
        read_i8 => i8,
        read_u16 => u16,
        read_i16 => i16,
        read_u32 => u32,
        read_i32 => i32,
        read_u64 => u64,
        read_i64 => i64,
        read_f32 => f32,
        read_f64 => f64,
    }

    /// Reads a 64-bit pointer, `None` if unreadable or below [`MIN_POINTER`]
    fn read_pointer(&mut self, address: Address) -> CeResult<Option<Address>> {
        let pointer = self.read_u64(address)?.filter(|&value| value >= MIN_POINTER);
        trace!(%address, pointer = ?pointer.map(Address::new), "read pointer");
        Ok(pointer.map(Address::new))
    }

    /// Reads `max_length` raw bytes and decodes them up to the first NUL.
    ///
    /// With `wide` the bytes are UTF-16LE units and a trailing odd byte is
    /// ignored. Invalid sequences are replaced rather than rejected.
    fn read_string(
        &mut self,
        address: Address,
        max_length: u32,
        wide: bool,
    ) -> CeResult<Option<String>> {
        let Some(bytes) = self.read_bytes(address, max_length)? else {
            return Ok(None);
        };
        Ok(Some(if wide {
            decode_wide(&bytes)
        } else {
            let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            String::from_utf8_lossy(&bytes[..len]).into_owned()
        }))
    }

    /// Reads a value of the given type.
    ///
    /// Variable-length types read [`DEFAULT_VARIABLE_LENGTH`] bytes.
    fn read_value(
        &mut self,
        address: Address,
        value_type: ValueType,
    ) -> CeResult<Option<MemoryValue>> {
        let size = value_type
            .size()
            .map(|s| s as u32)
            .unwrap_or(DEFAULT_VARIABLE_LENGTH);
        Ok(self
            .read_bytes(address, size)?
            .and_then(|bytes| MemoryValue::from_bytes(&bytes, value_type)))
    }
}

impl<M: MemorySource + ?Sized> MemorySource for &mut M {
    fn read_bytes(&mut self, address: Address, size: u32) -> CeResult<Option<Vec<u8>>> {
        (**self).read_bytes(address, size)
    }
}

/// Reads one opened process through a borrowed session
pub struct ProcessMemory<'a, S: Stream> {
    session: &'a mut Session<S>,
    process: &'a ProcessHandle,
}

impl<'a, S: Stream> ProcessMemory<'a, S> {
    pub fn new(session: &'a mut Session<S>, process: &'a ProcessHandle) -> Self {
        ProcessMemory { session, process }
    }
}

impl<S: Stream> MemorySource for ProcessMemory<'_, S> {
    fn read_bytes(&mut self, address: Address, size: u32) -> CeResult<Option<Vec<u8>>> {
        self.session
            .read_memory(self.process, address.as_u64(), size)
    }
}

fn decode_wide(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    String::from_utf16_lossy(&units)
}
