//! Decoded memory values and their types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::CeError;

/// A value decoded from target memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum MemoryValue {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bytes(Vec<u8>),
    String(String),
}

fn array<const N: usize>(bytes: &[u8]) -> Option<[u8; N]> {
    bytes.get(..N)?.try_into().ok()
}

impl MemoryValue {
    /// Returns the size in bytes of the value
    pub fn size(&self) -> usize {
        match self {
            MemoryValue::I8(_) | MemoryValue::U8(_) => 1,
            MemoryValue::I16(_) | MemoryValue::U16(_) => 2,
            MemoryValue::I32(_) | MemoryValue::U32(_) | MemoryValue::F32(_) => 4,
            MemoryValue::I64(_) | MemoryValue::U64(_) | MemoryValue::F64(_) => 8,
            MemoryValue::Bytes(b) => b.len(),
            MemoryValue::String(s) => s.len(),
        }
    }

    /// Little-endian byte representation, as stored in target memory
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            MemoryValue::I8(v) => v.to_le_bytes().to_vec(),
            MemoryValue::I16(v) => v.to_le_bytes().to_vec(),
            MemoryValue::I32(v) => v.to_le_bytes().to_vec(),
            MemoryValue::I64(v) => v.to_le_bytes().to_vec(),
            MemoryValue::U8(v) => v.to_le_bytes().to_vec(),
            MemoryValue::U16(v) => v.to_le_bytes().to_vec(),
            MemoryValue::U32(v) => v.to_le_bytes().to_vec(),
            MemoryValue::U64(v) => v.to_le_bytes().to_vec(),
            MemoryValue::F32(v) => v.to_le_bytes().to_vec(),
            MemoryValue::F64(v) => v.to_le_bytes().to_vec(),
            MemoryValue::Bytes(b) => b.clone(),
            MemoryValue::String(s) => s.as_bytes().to_vec(),
        }
    }

    /// Decodes a fixed-width little-endian value.
    ///
    /// Returns `None` when `bytes` is shorter than the type's width. Strings
    /// stop at the first NUL and are decoded lossily.
    pub fn from_bytes(bytes: &[u8], value_type: ValueType) -> Option<Self> {
        Some(match value_type {
            ValueType::I8 => MemoryValue::I8(i8::from_le_bytes(array(bytes)?)),
            ValueType::I16 => MemoryValue::I16(i16::from_le_bytes(array(bytes)?)),
            ValueType::I32 => MemoryValue::I32(i32::from_le_bytes(array(bytes)?)),
            ValueType::I64 => MemoryValue::I64(i64::from_le_bytes(array(bytes)?)),
            ValueType::U8 => MemoryValue::U8(u8::from_le_bytes(array(bytes)?)),
            ValueType::U16 => MemoryValue::U16(u16::from_le_bytes(array(bytes)?)),
            ValueType::U32 => MemoryValue::U32(u32::from_le_bytes(array(bytes)?)),
            ValueType::U64 => MemoryValue::U64(u64::from_le_bytes(array(bytes)?)),
            ValueType::F32 => MemoryValue::F32(f32::from_le_bytes(array(bytes)?)),
            ValueType::F64 => MemoryValue::F64(f64::from_le_bytes(array(bytes)?)),
            ValueType::Bytes => MemoryValue::Bytes(bytes.to_vec()),
            ValueType::String => {
                let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                MemoryValue::String(String::from_utf8_lossy(&bytes[..len]).into_owned())
            }
        })
    }

    /// Gets the value type enum for this value
    pub fn value_type(&self) -> ValueType {
        match self {
            MemoryValue::I8(_) => ValueType::I8,
            MemoryValue::I16(_) => ValueType::I16,
            MemoryValue::I32(_) => ValueType::I32,
            MemoryValue::I64(_) => ValueType::I64,
            MemoryValue::U8(_) => ValueType::U8,
            MemoryValue::U16(_) => ValueType::U16,
            MemoryValue::U32(_) => ValueType::U32,
            MemoryValue::U64(_) => ValueType::U64,
            MemoryValue::F32(_) => ValueType::F32,
            MemoryValue::F64(_) => ValueType::F64,
            MemoryValue::Bytes(_) => ValueType::Bytes,
            MemoryValue::String(_) => ValueType::String,
        }
    }
}

/// Enum representing the type of a memory value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bytes,
    String,
}

impl ValueType {
    /// Returns the size in bytes for this value type
    pub fn size(&self) -> Option<usize> {
        match self {
            ValueType::I8 | ValueType::U8 => Some(1),
            ValueType::I16 | ValueType::U16 => Some(2),
            ValueType::I32 | ValueType::U32 | ValueType::F32 => Some(4),
            ValueType::I64 | ValueType::U64 | ValueType::F64 => Some(8),
            ValueType::Bytes | ValueType::String => None,
        }
    }
}

impl FromStr for ValueType {
    type Err = CeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "i8" | "byte" => ValueType::I8,
            "i16" | "short" => ValueType::I16,
            "i32" | "int" | "int32" => ValueType::I32,
            "i64" | "long" | "int64" => ValueType::I64,
            "u8" => ValueType::U8,
            "u16" => ValueType::U16,
            "u32" => ValueType::U32,
            "u64" | "pointer" => ValueType::U64,
            "f32" | "float" => ValueType::F32,
            "f64" | "double" => ValueType::F64,
            "bytes" => ValueType::Bytes,
            "string" => ValueType::String,
            other => return Err(CeError::InvalidValueType(other.to_string())),
        })
    }
}

impl fmt::Display for MemoryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryValue::I8(v) => write!(f, "{}", v),
            MemoryValue::I16(v) => write!(f, "{}", v),
            MemoryValue::I32(v) => write!(f, "{}", v),
            MemoryValue::I64(v) => write!(f, "{}", v),
            MemoryValue::U8(v) => write!(f, "{}", v),
            MemoryValue::U16(v) => write!(f, "{}", v),
            MemoryValue::U32(v) => write!(f, "{}", v),
            MemoryValue::U64(v) => write!(f, "{}", v),
            MemoryValue::F32(v) => write!(f, "{}", v),
            MemoryValue::F64(v) => write!(f, "{}", v),
            MemoryValue::Bytes(b) => write!(f, "{}", hex::encode(b)),
            MemoryValue::String(s) => write!(f, "\"{}\"", s),
        }
    }
}
