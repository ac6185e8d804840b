//! Fill-pattern oracle.
//!
//! Byte `i` of a live allocation at address `a` holds `pattern(a, i)`. The
//! value depends on nothing but the address and offset, so checks are local
//! to one allocation and independent of allocation order.

const PATTERN_BASE: u8 = b'M';

#[inline]
pub fn pattern(address: usize, offset: usize) -> u8 {
    (PATTERN_BASE as usize)
        .wrapping_add(offset)
        .wrapping_add(address) as u8
}

/// Scrub value for freed bytes; never equal to the pattern.
#[inline]
pub fn filler(address: usize, offset: usize) -> u8 {
    !pattern(address, offset)
}

/// First byte that does not match the expected pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mismatch {
    pub offset: usize,
    pub expected: u8,
    pub actual: u8,
}

/// Stamp `[ptr, ptr + len)` with the pattern of `ptr`.
///
/// # Safety
///
/// `[ptr, ptr + len)` must be valid for writes.
pub unsafe fn stamp(ptr: *mut u8, len: usize) {
    let address = ptr as usize;
    log::trace!("stamp {:#x}..{:#x}", address, address.wrapping_add(len));
    let bytes = core::slice::from_raw_parts_mut(ptr, len);
    for (offset, byte) in bytes.iter_mut().enumerate() {
        *byte = pattern(address, offset);
    }
}

/// Check `[ptr, ptr + len)` against the pattern of `origin`, which differs
/// from `ptr` when the bytes were moved by a reallocation.
///
/// # Safety
///
/// `[ptr, ptr + len)` must be valid for reads.
pub unsafe fn verify(ptr: *const u8, len: usize, origin: usize) -> Option<Mismatch> {
    log::trace!(
        "verify {:#x}..{:#x} against pattern of {:#x}",
        ptr as usize,
        (ptr as usize).wrapping_add(len),
        origin
    );
    let bytes = core::slice::from_raw_parts(ptr, len);
    bytes
        .iter()
        .enumerate()
        .find(|&(offset, &byte)| byte != pattern(origin, offset))
        .map(|(offset, &actual)| Mismatch {
            offset,
            expected: pattern(origin, offset),
            actual,
        })
}

/// Overwrite `[ptr, ptr + len)` with filler so stale reads stand out.
///
/// # Safety
///
/// `[ptr, ptr + len)` must be valid for writes.
pub unsafe fn scrub(ptr: *mut u8, len: usize) {
    let address = ptr as usize;
    let bytes = core::slice::from_raw_parts_mut(ptr, len);
    for (offset, byte) in bytes.iter_mut().enumerate() {
        *byte = filler(address, offset);
    }
}
