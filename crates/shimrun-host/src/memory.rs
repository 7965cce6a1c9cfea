//! Guest linear memory access for host functions.
//!
//! Guest pointers and lengths arrive as `i32` but are unsigned offsets into
//! the exported `memory`. Every access is bounds-checked; an out-of-bounds
//! access traps the guest rather than being clamped.

use std::ops::Range;

use wasmtime::{Caller, Extern, Memory};

use shimrun_core::RunContext;

/// Name of the memory export host functions read from and write to.
pub const MEMORY_EXPORT: &str = "memory";

/// Look up the guest's exported memory.
pub fn guest_memory(caller: &mut Caller<'_, RunContext>) -> wasmtime::Result<Memory> {
    caller
        .get_export(MEMORY_EXPORT)
        .and_then(Extern::into_memory)
        .ok_or_else(|| wasmtime::Error::msg("guest module does not export `memory`"))
}

/// Convert a guest `(ptr, len)` pair into a byte range within a memory of
/// `memory_len` bytes.
#[allow(clippy::cast_sign_loss)]
pub fn guest_range(ptr: i32, len: i32, memory_len: usize) -> wasmtime::Result<Range<usize>> {
    checked_range(ptr as u32 as usize, len as u32 as usize, memory_len)
}

fn checked_range(start: usize, len: usize, memory_len: usize) -> wasmtime::Result<Range<usize>> {
    let end = start
        .checked_add(len)
        .filter(|&end| end <= memory_len)
        .ok_or_else(|| {
            wasmtime::Error::msg(format!(
                "guest memory access out of bounds: {start}+{len} > {memory_len}"
            ))
        })?;

    Ok(start..end)
}

/// Copy `len` bytes at `ptr` out of guest memory.
pub fn read_bytes(
    caller: &Caller<'_, RunContext>,
    memory: &Memory,
    ptr: i32,
    len: i32,
) -> wasmtime::Result<Vec<u8>> {
    let data = memory.data(caller);
    let range = guest_range(ptr, len, data.len())?;
    Ok(data[range].to_vec())
}

/// Copy `units` little-endian UTF-16 code units at `ptr` out of guest
/// memory.
#[allow(clippy::cast_sign_loss)]
pub fn read_utf16(
    caller: &Caller<'_, RunContext>,
    memory: &Memory,
    ptr: i32,
    units: i32,
) -> wasmtime::Result<Vec<u16>> {
    let data = memory.data(caller);
    let range = checked_range(ptr as u32 as usize, units as u32 as usize * 2, data.len())?;

    Ok(data[range]
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Copy `bytes` into the guest buffer `(dst, dst_cap)`.
///
/// The whole buffer must lie within memory. Returns the number of bytes
/// written, or `None` (writing nothing) when `bytes` does not fit.
pub fn write_bounded(
    caller: &mut Caller<'_, RunContext>,
    memory: &Memory,
    dst: i32,
    dst_cap: i32,
    bytes: &[u8],
) -> wasmtime::Result<Option<usize>> {
    let data = memory.data_mut(caller);
    let range = guest_range(dst, dst_cap, data.len())?;

    if bytes.len() > range.len() {
        return Ok(None);
    }

    data[range.start..range.start + bytes.len()].copy_from_slice(bytes);
    Ok(Some(bytes.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guest_range_in_bounds() {
        assert_eq!(guest_range(0, 16, 65536).unwrap(), 0..16);
        assert_eq!(guest_range(65520, 16, 65536).unwrap(), 65520..65536);
        assert_eq!(guest_range(100, 0, 65536).unwrap(), 100..100);
    }

    #[test]
    fn test_guest_range_out_of_bounds() {
        assert!(guest_range(65530, 16, 65536).is_err());
        assert!(guest_range(0, 65537, 65536).is_err());
    }

    #[test]
    fn test_guest_range_treats_negative_as_unsigned() {
        // -1 is offset 0xffff_ffff, far past any 1-page memory
        assert!(guest_range(-1, 1, 65536).is_err());
        assert!(guest_range(0, -1, 65536).is_err());
    }
}
