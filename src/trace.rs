//! Trace wire format.
//!
//! A trace is a 4-byte little-endian seed followed by a stream of one-byte
//! operation codes. Bytes that are not operation codes are handled by the
//! harness according to its [`UnknownBytePolicy`](crate::config::UnknownBytePolicy).

use crate::error::TraceError;
use core::fmt;

/// Length of the seed prefix in bytes.
pub const SEED_LEN: usize = 4;

/// One recognized operation of the trace alphabet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// `M`: allocate a random size.
    Allocate,
    /// `F`: free a random live allocation.
    Deallocate,
    /// `R`: resize a random live allocation to a random size.
    Reallocate,
    /// `A`: allocate a random size with a random power-of-two alignment.
    AlignedAllocate,
}

impl OpCode {
    /// Every operation code, memalign included.
    pub const ALL: [OpCode; 4] = [
        OpCode::Allocate,
        OpCode::Deallocate,
        OpCode::Reallocate,
        OpCode::AlignedAllocate,
    ];

    /// The alphabet without memalign.
    pub const BASIC: [OpCode; 3] = [OpCode::Allocate, OpCode::Deallocate, OpCode::Reallocate];

    pub const fn byte(self) -> u8 {
        match self {
            OpCode::Allocate => b'M',
            OpCode::Deallocate => b'F',
            OpCode::Reallocate => b'R',
            OpCode::AlignedAllocate => b'A',
        }
    }

    pub fn from_byte(byte: u8) -> Option<OpCode> {
        OpCode::ALL.iter().copied().find(|op| op.byte() == byte)
    }

    /// The C entry point this operation exercises.
    pub const fn name(self) -> &'static str {
        match self {
            OpCode::Allocate => "malloc",
            OpCode::Deallocate => "free",
            OpCode::Reallocate => "realloc",
            OpCode::AlignedAllocate => "memalign",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A borrowed, split trace buffer.
#[derive(Clone, Copy, Debug)]
pub struct Trace<'a> {
    seed: u32,
    ops: &'a [u8],
}

impl<'a> Trace<'a> {
    /// Split `data` into its seed and operation stream.
    pub fn parse(data: &'a [u8]) -> Result<Self, TraceError> {
        if data.len() < SEED_LEN {
            return Err(TraceError::TooShort { len: data.len() });
        }
        let (seed, ops) = data.split_at(SEED_LEN);
        let seed = u32::from_le_bytes([seed[0], seed[1], seed[2], seed[3]]);
        Ok(Trace { seed, ops })
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// The raw operation bytes, starting at trace offset [`SEED_LEN`].
    pub fn ops(&self) -> &'a [u8] {
        self.ops
    }
}

/// Returns the first byte of `seed` that is also an operation code in
/// `alphabet`, if any.
pub fn seed_collision(seed: u32, alphabet: &[OpCode]) -> Option<u8> {
    seed.to_le_bytes()
        .iter()
        .copied()
        .find(|&byte| alphabet.iter().any(|op| op.byte() == byte))
}

/// Encode `seed` and `ops` into the wire format.
pub fn encode(seed: u32, ops: &[OpCode]) -> Vec<u8> {
    let mut out = Vec::with_capacity(SEED_LEN + ops.len());
    out.extend_from_slice(&seed.to_le_bytes());
    out.extend(ops.iter().map(|op| op.byte()));
    out
}
