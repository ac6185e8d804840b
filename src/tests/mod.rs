mod arena;
mod oracles;

use crate::adapter::GlobalAllocAdapter;
use crate::config::HarnessConfig;
use crate::harness::Harness;
use std::alloc::System;

use arena::{Arena, Defect};

/// `seed` followed by the bytes of `ops`.
fn trace_of(seed: u32, ops: &str) -> Vec<u8> {
    let mut data = seed.to_le_bytes().to_vec();
    data.extend_from_slice(ops.as_bytes());
    data
}

fn system_harness(config: HarnessConfig) -> Harness<GlobalAllocAdapter<System>> {
    Harness::new(config, GlobalAllocAdapter::new(System))
}

fn arena_harness(config: HarnessConfig, defect: Defect) -> Harness<Arena> {
    Harness::new(config, Arena::new(defect))
}
