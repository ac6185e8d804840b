#![no_main]
use arbitrary::Arbitrary;
use hangover::trace::{self, SEED_LEN};
use hangover::{
    GlobalAllocAdapter, Granularity, Harness, HarnessConfig, OpCode, UnknownBytePolicy,
};
use libfuzzer_sys::fuzz_target;
use std::alloc::System;

#[derive(Debug, Arbitrary)]
enum Action {
    Malloc,
    Free,
    Realloc,
    Memalign,
}

impl From<Action> for OpCode {
    fn from(action: Action) -> OpCode {
        match action {
            Action::Malloc => OpCode::Allocate,
            Action::Free => OpCode::Deallocate,
            Action::Realloc => OpCode::Reallocate,
            Action::Memalign => OpCode::AlignedAllocate,
        }
    }
}

// Structured traces against the Rust global allocator, with the size range
// and oracle granularity chosen by the input too.
fuzz_target!(|data: (u32, u16, bool, Vec<Action>)| {
    let (seed, max_size, words, actions) = data;
    let granularity = if words {
        Granularity::Word
    } else {
        Granularity::Byte
    };
    let config = HarnessConfig::default()
        .with_max_size(usize::from(max_size))
        .with_granularity(granularity)
        .with_unknown_bytes(UnknownBytePolicy::Reject);

    let ops: Vec<OpCode> = actions.into_iter().map(OpCode::from).collect();
    let encoded = trace::encode(seed, &ops);
    assert_eq!(encoded.len(), SEED_LEN + ops.len());

    let mut harness = Harness::new(config, GlobalAllocAdapter::new(System));
    if let Ok(summary) = harness.run(&encoded) {
        assert_eq!(summary.seed, seed);
        assert_eq!(summary.live, harness.live_count());
        assert!(summary.live <= summary.allocations + summary.aligned_allocations);
    }
});
