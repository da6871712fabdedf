//! Multi-level pointer resolution

use crate::core::types::{parse_hex_or_decimal, Address, CeError, CeResult, MemoryValue, Offset, ValueType};
use crate::memory::reader::MemorySource;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Follows `offsets` from `base`.
///
/// Each step dereferences `current + offset`. The walk stops at the first
/// step that does not yield a valid pointer, so at most `offsets.len()`
/// reads are issued.
pub fn resolve<M: MemorySource + ?Sized>(
    source: &mut M,
    base: Address,
    offsets: &[Offset],
) -> CeResult<Option<Address>> {
    let mut current = base;
    for (level, &offset) in offsets.iter().enumerate() {
        match source.read_pointer(current.offset(offset))? {
            Some(next) => current = next,
            None => {
                debug!(%base, level, at = %current.offset(offset), "pointer chain broken");
                return Ok(None);
            }
        }
    }
    Ok(Some(current))
}

/// Resolves the chain, then reads a value at `resolved + final_offset`
pub fn read_chain_value<M: MemorySource + ?Sized>(
    source: &mut M,
    base: Address,
    offsets: &[Offset],
    final_offset: Offset,
    value_type: ValueType,
) -> CeResult<Option<MemoryValue>> {
    match resolve(source, base, offsets)? {
        Some(resolved) => source.read_value(resolved.offset(final_offset), value_type),
        None => Ok(None),
    }
}

/// A base address plus the offsets to follow from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerChain {
    pub base: Address,
    pub offsets: Vec<Offset>,
}

impl PointerChain {
    pub fn new(base: Address, offsets: Vec<Offset>) -> Self {
        PointerChain { base, offsets }
    }

    /// Number of dereferences
    pub fn depth(&self) -> usize {
        self.offsets.len()
    }

    /// Shifts the base, e.g. from a module-relative to an absolute address
    pub fn rebased(&self, module_base: Address) -> Self {
        PointerChain {
            base: module_base.offset(self.base.as_u64() as i64),
            offsets: self.offsets.clone(),
        }
    }

    pub fn resolve<M: MemorySource + ?Sized>(&self, source: &mut M) -> CeResult<Option<Address>> {
        resolve(source, self.base, &self.offsets)
    }

    pub fn read_value<M: MemorySource + ?Sized>(
        &self,
        source: &mut M,
        final_offset: Offset,
        value_type: ValueType,
    ) -> CeResult<Option<MemoryValue>> {
        read_chain_value(source, self.base, &self.offsets, final_offset, value_type)
    }
}

/// Parses a signed offset like `0x10`, `-0x8` or `24`
pub fn parse_offset(s: &str) -> CeResult<Offset> {
    let s = s.trim();
    let (negative, magnitude) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let value = parse_hex_or_decimal(magnitude)
        .map_err(|_| CeError::InvalidPointerChain(format!("bad offset '{}'", s)))?;
    let value = i64::try_from(value)
        .map_err(|_| CeError::InvalidPointerChain(format!("offset '{}' out of range", s)))?;
    Ok(if negative { -value } else { value })
}

impl FromStr for PointerChain {
    type Err = CeError;

    /// `"0x1000 -> 0x10 -> -0x8"`; a bare base is a chain without offsets
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split("->").map(str::trim);
        let base = match parts.next() {
            Some(base) if !base.is_empty() => base
                .parse::<Address>()
                .map_err(|_| CeError::InvalidPointerChain(format!("bad base '{}'", base)))?,
            _ => return Err(CeError::InvalidPointerChain("empty chain".to_string())),
        };
        let offsets = parts.map(parse_offset).collect::<CeResult<Vec<_>>>()?;
        Ok(PointerChain { base, offsets })
    }
}

impl fmt::Display for PointerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)?;
        for offset in &self.offsets {
            if *offset < 0 {
                write!(f, " -> -0x{:X}", offset.unsigned_abs())?;
            } else {
                write!(f, " -> 0x{:X}", offset)?;
            }
        }
        Ok(())
    }
}
