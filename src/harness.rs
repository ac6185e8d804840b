//! Trace interpreter and operation handlers.
//!
//! A [`Harness`] owns all bookkeeping of one replay: the random draws, the
//! live registry and both oracles. Nothing is shared between instances, so
//! independent replays can run on as many threads as there are harnesses.
//!
//! Every byte the allocator hands out is written: stamped with the fill
//! pattern on creation, checked and scrubbed on release. The harness relies
//! on the allocator under test returning writable blocks of at least the
//! requested size; that is the contract being checked, and a broken
//! allocator is expected to crash the process one way or another.

use crate::adapter::AllocatorAdapter;
use crate::config::{HarnessConfig, MalformedPolicy, UnknownBytePolicy};
use crate::draw::DrawSequence;
use crate::error::{Fault, TraceError, Violation};
use crate::occupancy::OccupancyOracle;
use crate::pattern;
use crate::registry::{AllocationRecord, Registry};
use crate::trace::{self, OpCode, Trace, SEED_LEN};

/// One decoded trace byte together with the values drawn for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Allocate { size: usize },
    AlignedAllocate { size: usize, alignment: usize },
    Deallocate { victim: usize },
    Reallocate { victim: usize, new_size: usize },
    Skip { byte: u8 },
}

/// Counters of one replay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub seed: u32,
    pub allocations: usize,
    pub aligned_allocations: usize,
    pub deallocations: usize,
    pub reallocations: usize,
    /// unknown bytes passed over
    pub skipped: usize,
    /// allocations still live
    pub live: usize,
}

/// Alignment a fresh block must satisfy.
#[derive(Clone, Copy)]
enum Alignment {
    /// scalar alignment, for blocks at least that large
    Natural,
    Exact(usize),
}

pub struct Harness<A: AllocatorAdapter> {
    config: HarnessConfig,
    adapter: A,
    draws: DrawSequence,
    registry: Registry,
    occupancy: OccupancyOracle,
    journal: Vec<Step>,
    summary: ReplaySummary,
    /// trace offset of the next byte
    position: usize,
}

impl<A: AllocatorAdapter> Harness<A> {
    /// `config` is normalized first, so out-of-range bounds never reach
    /// the draws or the alignment checks.
    pub fn new(config: HarnessConfig, adapter: A) -> Self {
        let config = config.normalized();
        Harness {
            config,
            adapter,
            draws: DrawSequence::new(0),
            registry: Registry::new(),
            occupancy: OccupancyOracle::new(config.granularity),
            journal: Vec::new(),
            summary: ReplaySummary::default(),
            position: SEED_LEN,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Replay a whole trace from a clean state.
    ///
    /// Allocations left over from an earlier replay are released first,
    /// with the same checks as a free. Panics on any allocator contract
    /// violation; malformed traces are reported or abort according to the
    /// configured [`MalformedPolicy`].
    pub fn run(&mut self, data: &[u8]) -> Result<ReplaySummary, TraceError> {
        let result = self.replay(data);
        self.settle(result)
    }

    /// Start an incremental replay seeded with `seed`.
    pub fn begin(&mut self, seed: u32) {
        if let Err(violation) = self.release_checked() {
            violated(&violation);
        }
        self.restart(seed);
    }

    /// Interpret one operation of an incremental replay.
    ///
    /// An operation outside the configured alphabet is handled like any
    /// other unrecognized byte.
    pub fn apply(&mut self, op: OpCode) -> Result<(), TraceError> {
        let result = self.step(op.byte());
        self.settle(result)
    }

    /// Free every live allocation, newest first, with the checks of a free.
    pub fn release_all(&mut self) {
        if let Err(violation) = self.release_checked() {
            violated(&violation);
        }
    }

    pub fn live_count(&self) -> usize {
        self.registry.len()
    }

    /// Live allocations, oldest first.
    pub fn records(&self) -> impl Iterator<Item = AllocationRecord> + '_ {
        self.registry.iter()
    }

    pub fn is_occupied(&self, address: usize) -> bool {
        self.occupancy.is_occupied(address)
    }

    /// Occupied units of the occupancy oracle; bytes unless tracking words.
    pub fn occupied_units(&self) -> usize {
        self.occupancy.occupied_units()
    }

    /// Steps of the current replay; empty unless journaling is enabled.
    pub fn journal(&self) -> &[Step] {
        &self.journal
    }

    pub fn summary(&self) -> ReplaySummary {
        ReplaySummary {
            live: self.registry.len(),
            ..self.summary
        }
    }

    pub(crate) fn replay(&mut self, data: &[u8]) -> Result<ReplaySummary, Fault> {
        self.release_checked()?;
        let trace = Trace::parse(data)?;
        if self.config.reject_seed_opcodes {
            if let Some(byte) = trace::seed_collision(trace.seed(), self.config.alphabet()) {
                return Err(TraceError::SeedCollision { byte }.into());
            }
        }
        self.restart(trace.seed());
        log::info!(
            "replaying seed {:#010x} with {} op bytes",
            trace.seed(),
            trace.ops().len()
        );
        for &byte in trace.ops() {
            self.step(byte)?;
        }
        let summary = self.summary();
        log::info!(
            "replay finished after {} draws: {:?}",
            self.draws.drawn(),
            summary
        );
        Ok(summary)
    }

    fn restart(&mut self, seed: u32) {
        debug_assert_eq!(self.occupancy.occupied_units(), 0);
        self.occupancy.clear();
        self.draws = DrawSequence::new(seed);
        self.journal.clear();
        self.summary = ReplaySummary {
            seed,
            ..ReplaySummary::default()
        };
        self.position = SEED_LEN;
    }

    fn settle<T>(&self, result: Result<T, Fault>) -> Result<T, TraceError> {
        match result {
            Ok(value) => Ok(value),
            Err(Fault::Violation(violation)) => violated(&violation),
            Err(Fault::Trace(error)) => {
                if error.is_malformed() && self.config.malformed == MalformedPolicy::Abort {
                    log::error!("malformed trace: {}", error);
                    panic!("malformed trace: {}", error);
                }
                log::info!("trace rejected: {}", error);
                Err(error)
            }
        }
    }

    fn record(&mut self, step: Step) {
        if self.config.journal {
            self.journal.push(step);
        }
    }

    pub(crate) fn step(&mut self, byte: u8) -> Result<(), Fault> {
        let position = self.position;
        self.position += 1;
        let op = match self.config.decode(byte) {
            Some(op) => op,
            None => {
                return match self.config.unknown_bytes {
                    UnknownBytePolicy::Skip => {
                        self.summary.skipped += 1;
                        self.record(Step::Skip { byte });
                        Ok(())
                    }
                    UnknownBytePolicy::Reject => {
                        Err(TraceError::UnknownOpcode { byte, position }.into())
                    }
                };
            }
        };
        match op {
            OpCode::Allocate => self.simulate_malloc(position),
            OpCode::AlignedAllocate => self.simulate_memalign(position),
            OpCode::Deallocate => self.simulate_free(position),
            OpCode::Reallocate => self.simulate_realloc(position),
        }
    }

    fn draw_size(&mut self) -> usize {
        match self.draws.size(self.config.max_size) {
            0 => self.config.min_size,
            size => size,
        }
    }

    fn simulate_malloc(&mut self, position: usize) -> Result<(), Fault> {
        let size = self.draw_size();
        self.record(Step::Allocate { size });
        self.allocate(position, size)
    }

    fn simulate_memalign(&mut self, position: usize) -> Result<(), Fault> {
        let size = self.draw_size();
        let alignment = self
            .draws
            .alignment(self.config.max_size, self.config.scalar_align);
        self.record(Step::AlignedAllocate { size, alignment });
        self.allocate_aligned(position, alignment, size)
    }

    fn simulate_free(&mut self, position: usize) -> Result<(), Fault> {
        let victim = self.draw_victim(OpCode::Deallocate, position)?;
        self.record(Step::Deallocate { victim });
        self.deallocate(victim)
    }

    fn simulate_realloc(&mut self, position: usize) -> Result<(), Fault> {
        let victim = self.draw_victim(OpCode::Reallocate, position)?;
        let new_size = self.draws.size(self.config.max_size);
        self.record(Step::Reallocate { victim, new_size });
        self.reallocate(position, victim, new_size)
    }

    fn draw_victim(&mut self, op: OpCode, position: usize) -> Result<usize, Fault> {
        if self.registry.is_empty() {
            return Err(TraceError::EmptyLiveSet { op, position }.into());
        }
        Ok(self.draws.victim(self.registry.len()))
    }

    pub(crate) fn allocate(&mut self, position: usize, size: usize) -> Result<(), Fault> {
        let ptr = self.adapter.allocate(size);
        self.admit(OpCode::Allocate, position, ptr, size, Alignment::Natural)?;
        self.summary.allocations += 1;
        Ok(())
    }

    pub(crate) fn allocate_aligned(
        &mut self,
        position: usize,
        alignment: usize,
        size: usize,
    ) -> Result<(), Fault> {
        let ptr = self.adapter.allocate_aligned(alignment, size);
        self.admit(
            OpCode::AlignedAllocate,
            position,
            ptr,
            size,
            Alignment::Exact(alignment),
        )?;
        self.summary.aligned_allocations += 1;
        Ok(())
    }

    pub(crate) fn deallocate(&mut self, victim: usize) -> Result<(), Fault> {
        self.release(OpCode::Deallocate, victim)?;
        self.summary.deallocations += 1;
        Ok(())
    }

    /// A zero `new_size` frees the victim through `deallocate`; the
    /// adapter's reallocate is only ever asked for a nonzero size.
    pub(crate) fn reallocate(
        &mut self,
        position: usize,
        victim: usize,
        new_size: usize,
    ) -> Result<(), Fault> {
        const OP: OpCode = OpCode::Reallocate;
        if new_size == 0 {
            self.release(OP, victim)?;
            self.summary.reallocations += 1;
            return Ok(());
        }

        let old = self.registry.get(victim);
        debug_assert_eq!(self.registry.size_of(old.address()), Some(old.size));
        self.check_usable(OP, old.ptr, old.size)?;
        self.check_pattern(OP, old)?;

        let new_ptr = unsafe { self.adapter.reallocate(old.ptr, new_size) };
        self.check_null(OP, position, new_ptr, new_size)?;
        let new_address = new_ptr as usize;

        let kept = old.size.min(new_size);
        if let Some(mismatch) = unsafe { pattern::verify(new_ptr, kept, old.address()) } {
            return Err(Violation::ContentLost {
                old_address: old.address(),
                new_address,
                offset: mismatch.offset,
                expected: mismatch.expected,
                actual: mismatch.actual,
            }
            .into());
        }
        self.check_usable(OP, new_ptr, new_size)?;
        self.check_alignment(OP, new_address, new_size, Alignment::Natural)?;

        self.occupancy.release(old.address(), old.size);
        self.occupancy
            .reserve(new_address, new_size)
            .map_err(|byte| Violation::Overlap {
                op: OP,
                address: new_address,
                size: new_size,
                byte,
            })?;
        unsafe { pattern::stamp(new_ptr, new_size) };

        if new_address == old.address() {
            self.registry.resize(victim, new_size);
        } else {
            self.registry.remove(victim);
            self.registry.insert(AllocationRecord::new(new_ptr, new_size));
        }
        log::debug!(
            "REALLOC {} -> {} ({:#x} -> {:#x})",
            old.size,
            new_size,
            old.address(),
            new_address
        );
        self.summary.reallocations += 1;
        Ok(())
    }

    /// Check a fresh block and start tracking it.
    fn admit(
        &mut self,
        op: OpCode,
        position: usize,
        ptr: *mut u8,
        size: usize,
        alignment: Alignment,
    ) -> Result<(), Fault> {
        self.check_null(op, position, ptr, size)?;
        let address = ptr as usize;
        self.check_usable(op, ptr, size)?;
        self.check_alignment(op, address, size, alignment)?;
        self.occupancy
            .reserve(address, size)
            .map_err(|byte| Violation::Overlap {
                op,
                address,
                size,
                byte,
            })?;
        unsafe { pattern::stamp(ptr, size) };
        self.registry.insert(AllocationRecord::new(ptr, size));
        log::debug!("{} {} = {:#x}", op, size, address);
        Ok(())
    }

    /// Check, scrub, untrack and free the live allocation at `index`.
    fn release(&mut self, op: OpCode, index: usize) -> Result<(), Violation> {
        let record = self.registry.get(index);
        debug_assert_eq!(self.registry.size_of(record.address()), Some(record.size));
        self.check_usable(op, record.ptr, record.size)?;
        self.check_pattern(op, record)?;
        unsafe { pattern::scrub(record.ptr, record.size) };
        let cleared = self.occupancy.release(record.address(), record.size);
        debug_assert!(record.size == 0 || cleared > 0);
        self.registry.remove(index);
        log::debug!("FREE {:#x} ({} bytes)", record.address(), record.size);
        unsafe { self.adapter.deallocate(record.ptr) };
        Ok(())
    }

    fn release_checked(&mut self) -> Result<(), Violation> {
        while !self.registry.is_empty() {
            self.release(OpCode::Deallocate, self.registry.len() - 1)?;
        }
        Ok(())
    }

    fn check_null(
        &self,
        op: OpCode,
        position: usize,
        ptr: *mut u8,
        size: usize,
    ) -> Result<(), Fault> {
        if !ptr.is_null() {
            return Ok(());
        }
        if self.config.tolerate_null {
            Err(TraceError::AllocatorExhausted { op, position, size }.into())
        } else {
            Err(Violation::NullAllocation { op, size }.into())
        }
    }

    fn check_usable(&self, op: OpCode, ptr: *mut u8, requested: usize) -> Result<(), Violation> {
        let usable = unsafe { self.adapter.usable_size(ptr) };
        if usable < requested {
            return Err(Violation::UsableSizeShortfall {
                op,
                address: ptr as usize,
                requested,
                usable,
            });
        }
        Ok(())
    }

    fn check_alignment(
        &self,
        op: OpCode,
        address: usize,
        size: usize,
        alignment: Alignment,
    ) -> Result<(), Violation> {
        let alignment = match alignment {
            Alignment::Natural if size < self.config.scalar_align => return Ok(()),
            Alignment::Natural => self.config.scalar_align,
            Alignment::Exact(alignment) => alignment,
        };
        if address % alignment != 0 {
            return Err(Violation::Misaligned {
                op,
                address,
                alignment,
            });
        }
        Ok(())
    }

    fn check_pattern(&self, op: OpCode, record: AllocationRecord) -> Result<(), Violation> {
        match unsafe { pattern::verify(record.ptr, record.size, record.address()) } {
            Some(mismatch) => Err(Violation::PatternMismatch {
                op,
                address: record.address(),
                offset: mismatch.offset,
                expected: mismatch.expected,
                actual: mismatch.actual,
            }),
            None => Ok(()),
        }
    }
}

impl<A: AllocatorAdapter> Drop for Harness<A> {
    fn drop(&mut self) {
        // the allocator is suspect after a failed check; leave it alone
        if std::thread::panicking() {
            return;
        }
        for record in self.registry.drain() {
            unsafe { self.adapter.deallocate(record.ptr) };
        }
    }
}

fn violated(violation: &Violation) -> ! {
    log::error!("allocator contract violated: {}", violation);
    panic!("allocator contract violated: {}", violation);
}
