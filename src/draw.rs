//! Deterministic random source.
//!
//! Every randomized decision of a replay is drawn from here, in the order
//! the handlers ask for it, so the same seed always yields the same
//! sequence of sizes, alignments and victims.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub struct DrawSequence {
    rng: ChaCha8Rng,
    drawn: u64,
}

impl DrawSequence {
    pub fn new(seed: u32) -> Self {
        DrawSequence {
            rng: ChaCha8Rng::seed_from_u64(u64::from(seed)),
            drawn: 0,
        }
    }

    /// A size uniform in `[0, max)`.
    pub fn size(&mut self, max: usize) -> usize {
        self.below(max)
    }

    /// A power of two uniform (by exponent) in `[1, max]`, raised to `floor`.
    pub fn alignment(&mut self, max: usize, floor: usize) -> usize {
        let max_shift = max.max(1).ilog2();
        self.drawn += 1;
        let alignment = 1usize << self.rng.gen_range(0..=max_shift);
        alignment.max(floor)
    }

    /// A victim index uniform over `live` allocations.
    pub fn victim(&mut self, live: usize) -> usize {
        self.below(live)
    }

    /// Number of values drawn since seeding.
    pub fn drawn(&self) -> u64 {
        self.drawn
    }

    fn below(&mut self, bound: usize) -> usize {
        debug_assert!(bound > 0, "empty draw range");
        self.drawn += 1;
        self.rng.gen_range(0..bound)
    }
}
