//! Fixed-layout request and response structs
//!
//! Every struct declares its own byte order. The version handshake is
//! big-endian while every operational struct is little-endian, so byte order
//! is never a connection-wide setting.
//!
//! Variable-length data (version strings, process and module names, memory
//! contents) is never part of a struct. Its length travels in a fixed field
//! and the bytes are read by a second, separate exact receive.

use crate::core::types::{CeError, CeResult};
use crate::protocol::command::Command;

/// Byte order of a wire struct's multi-byte fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

/// Serializes fields in a fixed byte order
pub struct FieldWriter {
    buf: Vec<u8>,
    order: ByteOrder,
}

impl FieldWriter {
    pub fn new(order: ByteOrder, capacity: usize) -> Self {
        FieldWriter {
            buf: Vec::with_capacity(capacity),
            order,
        }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u32(&mut self, v: u32) {
        match self.order {
            ByteOrder::Big => self.buf.extend_from_slice(&v.to_be_bytes()),
            ByteOrder::Little => self.buf.extend_from_slice(&v.to_le_bytes()),
        }
    }

    pub fn put_i32(&mut self, v: i32) {
        self.put_u32(v as u32);
    }

    pub fn put_u64(&mut self, v: u64) {
        match self.order {
            ByteOrder::Big => self.buf.extend_from_slice(&v.to_be_bytes()),
            ByteOrder::Little => self.buf.extend_from_slice(&v.to_le_bytes()),
        }
    }

    pub fn put_i64(&mut self, v: i64) {
        self.put_u64(v as u64);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Deserializes fields in a fixed byte order
pub struct FieldReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    order: ByteOrder,
}

impl<'a> FieldReader<'a> {
    pub fn new(bytes: &'a [u8], order: ByteOrder) -> Self {
        FieldReader {
            bytes,
            pos: 0,
            order,
        }
    }

    fn take<const N: usize>(&mut self) -> CeResult<[u8; N]> {
        let end = self.pos + N;
        let field: [u8; N] = self
            .bytes
            .get(self.pos..end)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| {
                CeError::malformed(format!(
                    "field at offset {} needs {} bytes, only {} available",
                    self.pos,
                    N,
                    self.bytes.len().saturating_sub(self.pos)
                ))
            })?;
        self.pos = end;
        Ok(field)
    }

    pub fn get_u8(&mut self) -> CeResult<u8> {
        Ok(self.take::<1>()?[0])
    }

    pub fn get_u32(&mut self) -> CeResult<u32> {
        let raw = self.take::<4>()?;
        Ok(match self.order {
            ByteOrder::Big => u32::from_be_bytes(raw),
            ByteOrder::Little => u32::from_le_bytes(raw),
        })
    }

    pub fn get_i32(&mut self) -> CeResult<i32> {
        Ok(self.get_u32()? as i32)
    }

    pub fn get_u64(&mut self) -> CeResult<u64> {
        let raw = self.take::<8>()?;
        Ok(match self.order {
            ByteOrder::Big => u64::from_be_bytes(raw),
            ByteOrder::Little => u64::from_le_bytes(raw),
        })
    }

    pub fn get_i64(&mut self) -> CeResult<i64> {
        Ok(self.get_u64()? as i64)
    }
}

/// A struct with a fixed size and byte order on the wire
pub trait WireStruct: Sized {
    /// Exact encoded size in bytes
    const SIZE: usize;
    /// Byte order of every multi-byte field
    const ORDER: ByteOrder;

    fn write_fields(&self, w: &mut FieldWriter);

    fn read_fields(r: &mut FieldReader<'_>) -> CeResult<Self>;

    fn encode(&self) -> Vec<u8> {
        let mut w = FieldWriter::new(Self::ORDER, Self::SIZE);
        self.write_fields(&mut w);
        w.into_bytes()
    }

    /// Decodes exactly `SIZE` bytes
    fn decode(bytes: &[u8]) -> CeResult<Self> {
        if bytes.len() != Self::SIZE {
            return Err(CeError::malformed(format!(
                "{} expects {} bytes, got {}",
                std::any::type_name::<Self>()
                    .rsplit("::")
                    .next()
                    .unwrap_or("struct"),
                Self::SIZE,
                bytes.len()
            )));
        }
        Self::read_fields(&mut FieldReader::new(bytes, Self::ORDER))
    }
}

/// Command byte followed by the request struct
pub fn encode_request<T: WireStruct>(command: Command, request: &T) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + T::SIZE);
    frame.push(command.id());
    frame.extend_from_slice(&request.encode());
    frame
}

/// A request consisting of the command byte alone
pub fn encode_bare(command: Command) -> Vec<u8> {
    vec![command.id()]
}

/// Converts a signed length field into a byte count, bounded by `limit`
pub fn trailing_len(field: &str, value: i64, limit: usize) -> CeResult<usize> {
    let len = usize::try_from(value)
        .map_err(|_| CeError::malformed(format!("{} is negative ({})", field, value)))?;
    if len > limit {
        return Err(CeError::malformed(format!(
            "{} of {} bytes exceeds the {} byte limit",
            field, len, limit
        )));
    }
    Ok(len)
}

// ---------------------------------------------------------------------------
// Handshake

/// CMD_GETVERSION response header; the version string follows separately
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionHeader {
    pub version: i32,
    pub string_size: u8,
}

impl WireStruct for VersionHeader {
    const SIZE: usize = 5;
    const ORDER: ByteOrder = ByteOrder::Big;

    fn write_fields(&self, w: &mut FieldWriter) {
        w.put_i32(self.version);
        w.put_u8(self.string_size);
    }

    fn read_fields(r: &mut FieldReader<'_>) -> CeResult<Self> {
        Ok(VersionHeader {
            version: r.get_i32()?,
            string_size: r.get_u8()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Handles

/// A bare 32-bit handle or pid: the OpenProcess / CloseHandle /
/// First / Next request bodies and the handle-valued responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleField {
    pub value: u32,
}

impl WireStruct for HandleField {
    const SIZE: usize = 4;
    const ORDER: ByteOrder = ByteOrder::Little;

    fn write_fields(&self, w: &mut FieldWriter) {
        w.put_u32(self.value);
    }

    fn read_fields(r: &mut FieldReader<'_>) -> CeResult<Self> {
        Ok(HandleField {
            value: r.get_u32()?,
        })
    }
}

/// CMD_CREATETOOLHELP32SNAPSHOT(EX) request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotRequest {
    pub flags: u32,
    pub pid: u32,
}

impl WireStruct for SnapshotRequest {
    const SIZE: usize = 8;
    const ORDER: ByteOrder = ByteOrder::Little;

    fn write_fields(&self, w: &mut FieldWriter) {
        w.put_u32(self.flags);
        w.put_u32(self.pid);
    }

    fn read_fields(r: &mut FieldReader<'_>) -> CeResult<Self> {
        Ok(SnapshotRequest {
            flags: r.get_u32()?,
            pid: r.get_u32()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Enumeration

/// CMD_PROCESS32FIRST/NEXT response header; the name follows when `result != 0`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessEntryHeader {
    pub result: i32,
    pub pid: i32,
    pub name_size: i32,
}

impl WireStruct for ProcessEntryHeader {
    const SIZE: usize = 12;
    const ORDER: ByteOrder = ByteOrder::Little;

    fn write_fields(&self, w: &mut FieldWriter) {
        w.put_i32(self.result);
        w.put_i32(self.pid);
        w.put_i32(self.name_size);
    }

    fn read_fields(r: &mut FieldReader<'_>) -> CeResult<Self> {
        Ok(ProcessEntryHeader {
            result: r.get_i32()?,
            pid: r.get_i32()?,
            name_size: r.get_i32()?,
        })
    }
}

/// CMD_MODULE32FIRST/NEXT response header; the name follows when `result != 0`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleEntryHeader {
    pub result: i32,
    pub base: i64,
    pub part: i32,
    pub size: i32,
    pub file_offset: u32,
    pub name_size: i32,
}

impl WireStruct for ModuleEntryHeader {
    const SIZE: usize = 28;
    const ORDER: ByteOrder = ByteOrder::Little;

    fn write_fields(&self, w: &mut FieldWriter) {
        w.put_i32(self.result);
        w.put_i64(self.base);
        w.put_i32(self.part);
        w.put_i32(self.size);
        w.put_u32(self.file_offset);
        w.put_i32(self.name_size);
    }

    fn read_fields(r: &mut FieldReader<'_>) -> CeResult<Self> {
        Ok(ModuleEntryHeader {
            result: r.get_i32()?,
            base: r.get_i64()?,
            part: r.get_i32()?,
            size: r.get_i32()?,
            file_offset: r.get_u32()?,
            name_size: r.get_i32()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Memory

/// CMD_READPROCESSMEMORY request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadMemoryRequest {
    pub handle: u32,
    pub address: u64,
    pub size: u32,
    /// zlib level, 0 for a plain response
    pub compress: u8,
}

impl WireStruct for ReadMemoryRequest {
    const SIZE: usize = 17;
    const ORDER: ByteOrder = ByteOrder::Little;

    fn write_fields(&self, w: &mut FieldWriter) {
        w.put_u32(self.handle);
        w.put_u64(self.address);
        w.put_u32(self.size);
        w.put_u8(self.compress);
    }

    fn read_fields(r: &mut FieldReader<'_>) -> CeResult<Self> {
        Ok(ReadMemoryRequest {
            handle: r.get_u32()?,
            address: r.get_u64()?,
            size: r.get_u32()?,
            compress: r.get_u8()?,
        })
    }
}

/// Plain CMD_READPROCESSMEMORY response header; `read` bytes follow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadMemoryHeader {
    pub read: u32,
}

impl WireStruct for ReadMemoryHeader {
    const SIZE: usize = 4;
    const ORDER: ByteOrder = ByteOrder::Little;

    fn write_fields(&self, w: &mut FieldWriter) {
        w.put_u32(self.read);
    }

    fn read_fields(r: &mut FieldReader<'_>) -> CeResult<Self> {
        Ok(ReadMemoryHeader { read: r.get_u32()? })
    }
}

/// Compressed CMD_READPROCESSMEMORY response header; a zlib stream of
/// `compressed_size` bytes follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedReadHeader {
    pub uncompressed_size: u32,
    pub compressed_size: u32,
}

impl WireStruct for CompressedReadHeader {
    const SIZE: usize = 8;
    const ORDER: ByteOrder = ByteOrder::Little;

    fn write_fields(&self, w: &mut FieldWriter) {
        w.put_u32(self.uncompressed_size);
        w.put_u32(self.compressed_size);
    }

    fn read_fields(r: &mut FieldReader<'_>) -> CeResult<Self> {
        Ok(CompressedReadHeader {
            uncompressed_size: r.get_u32()?,
            compressed_size: r.get_u32()?,
        })
    }
}

/// CMD_VIRTUALQUERYEX request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualQueryRequest {
    pub handle: u32,
    pub address: u64,
}

impl WireStruct for VirtualQueryRequest {
    const SIZE: usize = 12;
    const ORDER: ByteOrder = ByteOrder::Little;

    fn write_fields(&self, w: &mut FieldWriter) {
        w.put_u32(self.handle);
        w.put_u64(self.address);
    }

    fn read_fields(r: &mut FieldReader<'_>) -> CeResult<Self> {
        Ok(VirtualQueryRequest {
            handle: r.get_u32()?,
            address: r.get_u64()?,
        })
    }
}

/// CMD_VIRTUALQUERYEX response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualQueryResponse {
    pub result: u8,
    pub protection: u32,
    pub region_type: u32,
    pub base_address: u64,
    pub size: u64,
}

impl WireStruct for VirtualQueryResponse {
    const SIZE: usize = 25;
    const ORDER: ByteOrder = ByteOrder::Little;

    fn write_fields(&self, w: &mut FieldWriter) {
        w.put_u8(self.result);
        w.put_u32(self.protection);
        w.put_u32(self.region_type);
        w.put_u64(self.base_address);
        w.put_u64(self.size);
    }

    fn read_fields(r: &mut FieldReader<'_>) -> CeResult<Self> {
        Ok(VirtualQueryResponse {
            result: r.get_u8()?,
            protection: r.get_u32()?,
            region_type: r.get_u32()?,
            base_address: r.get_u64()?,
            size: r.get_u64()?,
        })
    }
}
