//! Hangover replays byte-encoded traces of `malloc`/`free`/`realloc`/
//! `memalign` calls against an allocator and checks, after every call, that
//! live blocks never overlap, are aligned, are at least as large as asked
//! for, and keep their contents until freed or across a `realloc`.
//!
//! A trace is a 4-byte seed followed by operation codes `M`, `F`, `R` and
//! `A`. Sizes, alignments and victims are drawn from the seed, so a trace
//! replays identically every time and a fuzzer can minimize it.

pub mod adapter;
pub mod config;
pub mod draw;
pub mod error;
pub mod harness;
pub mod occupancy;
pub mod pattern;
pub mod registry;
#[cfg(test)]
mod tests;
pub mod trace;
pub mod tracegen;

#[cfg(any(target_os = "linux", target_os = "macos"))]
pub use crate::adapter::SystemMalloc;
pub use crate::adapter::{AllocatorAdapter, GlobalAllocAdapter};
pub use crate::config::{HarnessConfig, MalformedPolicy, UnknownBytePolicy};
pub use crate::error::{TraceError, Violation};
pub use crate::harness::{Harness, ReplaySummary, Step};
pub use crate::occupancy::Granularity;
pub use crate::trace::OpCode;

/// Largest trace the standalone replay driver reads.
pub const MAX_INPUT_LEN: usize = 65536;

/// Replay one fuzzer input against the system allocator.
///
/// Returns 0 for a fully interpreted trace and -1 for a rejected one. Each
/// call runs on a fresh harness; only the configuration, read once from the
/// environment, outlives it.
#[cfg(any(target_os = "linux", target_os = "macos"))]
pub fn fuzz_one_input(data: &[u8]) -> i32 {
    use std::sync::OnceLock;

    static CONFIG: OnceLock<HarnessConfig> = OnceLock::new();
    let config = *CONFIG.get_or_init(HarnessConfig::from_env);
    let mut harness = Harness::new(config, SystemMalloc);
    match harness.run(data) {
        Ok(_) => 0,
        Err(_) => -1,
    }
}
