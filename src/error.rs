//! Failure classes of a replay.

use crate::trace::OpCode;
use thiserror::Error;

/// A broken allocator contract. These are the findings the harness exists
/// for; public entry points never return them, they abort.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("{op}: allocator returned null for {size} bytes")]
    NullAllocation { op: OpCode, size: usize },

    #[error("{op}: address {address:#x} is not aligned to {alignment}")]
    Misaligned {
        op: OpCode,
        address: usize,
        alignment: usize,
    },

    #[error("{op}: usable size {usable} of {address:#x} is less than requested {requested}")]
    UsableSizeShortfall {
        op: OpCode,
        address: usize,
        requested: usize,
        usable: usize,
    },

    #[error("{op}: {size} bytes at {address:#x} overlap a live allocation at byte {byte:#x}")]
    Overlap {
        op: OpCode,
        address: usize,
        size: usize,
        byte: usize,
    },

    #[error(
        "{op}: byte {offset} of {address:#x} reads {actual:#04x}, expected fill pattern {expected:#04x}"
    )]
    PatternMismatch {
        op: OpCode,
        address: usize,
        offset: usize,
        expected: u8,
        actual: u8,
    },

    #[error(
        "realloc: byte {offset} moved from {old_address:#x} to {new_address:#x} reads {actual:#04x}, expected {expected:#04x}"
    )]
    ContentLost {
        old_address: usize,
        new_address: usize,
        offset: usize,
        expected: u8,
        actual: u8,
    },
}

/// A trace the harness declines to interpret any further.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    #[error("trace is {len} bytes, shorter than the 4-byte seed")]
    TooShort { len: usize },

    #[error("seed byte {byte:#04x} collides with an operation code")]
    SeedCollision { byte: u8 },

    #[error("unrecognized byte {byte:#04x} at offset {position}")]
    UnknownOpcode { byte: u8, position: usize },

    #[error("{op} at offset {position} with no live allocations")]
    EmptyLiveSet { op: OpCode, position: usize },

    #[error("{op} at offset {position}: allocator exhausted requesting {size} bytes")]
    AllocatorExhausted {
        op: OpCode,
        position: usize,
        size: usize,
    },
}

impl TraceError {
    /// Whether the trace itself is at fault, as opposed to a tolerated
    /// out-of-memory condition.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, TraceError::AllocatorExhausted { .. })
    }
}

/// Everything a handler can fail with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Fault {
    Violation(Violation),
    Trace(TraceError),
}

impl From<Violation> for Fault {
    fn from(violation: Violation) -> Self {
        Fault::Violation(violation)
    }
}

impl From<TraceError> for Fault {
    fn from(error: TraceError) -> Self {
        Fault::Trace(error)
    }
}
