//! Random trace generation for seed corpora.

use crate::trace::{self, OpCode, SEED_LEN};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GeneratorOptions {
    /// number of operation codes after the seed
    pub ops: usize,
    /// include `A` in the alphabet
    pub aligned: bool,
    /// never emit `F` or `R` unless an allocation is certainly live
    pub well_formed: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        GeneratorOptions {
            ops: 65536,
            aligned: false,
            well_formed: false,
        }
    }
}

impl GeneratorOptions {
    pub fn alphabet(&self) -> &'static [OpCode] {
        if self.aligned {
            &OpCode::ALL
        } else {
            &OpCode::BASIC
        }
    }
}

/// Emit a seed whose bytes avoid every operation code, then `options.ops`
/// uniformly chosen operation codes.
///
/// With `well_formed`, the generator keeps a lower bound on the live count
/// (a `realloc` may free) and substitutes `M` for `F`/`R` when it is zero.
pub fn generate<R: Rng>(rng: &mut R, options: &GeneratorOptions) -> Vec<u8> {
    let alphabet = options.alphabet();
    let seed = loop {
        let seed: u32 = rng.gen();
        if trace::seed_collision(seed, &OpCode::ALL).is_none() {
            break seed;
        }
    };

    let mut out = Vec::with_capacity(SEED_LEN + options.ops);
    out.extend_from_slice(&seed.to_le_bytes());
    let mut live_floor = 0usize;
    for _ in 0..options.ops {
        let mut op = alphabet[rng.gen_range(0..alphabet.len())];
        if options.well_formed {
            match op {
                OpCode::Deallocate | OpCode::Reallocate if live_floor == 0 => {
                    op = OpCode::Allocate;
                    live_floor += 1;
                }
                OpCode::Deallocate | OpCode::Reallocate => live_floor -= 1,
                OpCode::Allocate | OpCode::AlignedAllocate => live_floor += 1,
            }
        }
        out.push(op.byte());
    }
    out
}

/// [`generate`] from a fixed generator seed.
pub fn generate_seeded(seed: u64, options: &GeneratorOptions) -> Vec<u8> {
    generate(&mut ChaCha8Rng::seed_from_u64(seed), options)
}
