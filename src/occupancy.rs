//! Byte-occupancy oracle.
//!
//! Records which addresses belong to some live allocation. Absent keys read
//! as free, so only occupied units are stored.

use std::collections::HashSet;
use std::ops::Range;

/// Tracking unit of the oracle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Granularity {
    #[default]
    Byte,
    /// Machine words. Two allocations sharing a word count as overlapping.
    Word,
}

impl Granularity {
    pub const fn unit(self) -> usize {
        match self {
            Granularity::Byte => 1,
            Granularity::Word => core::mem::size_of::<usize>(),
        }
    }
}

pub struct OccupancyOracle {
    unit: usize,
    occupied: HashSet<usize>,
}

impl OccupancyOracle {
    pub fn new(granularity: Granularity) -> Self {
        OccupancyOracle {
            unit: granularity.unit(),
            occupied: HashSet::new(),
        }
    }

    /// unit indices covered by `[address, address + size)`
    fn units(&self, address: usize, size: usize) -> Range<usize> {
        if size == 0 {
            return 0..0;
        }
        let last = address.saturating_add(size - 1);
        (address / self.unit)..(last / self.unit + 1)
    }

    /// The lowest occupied address in `[address, address + size)`.
    pub fn first_occupied(&self, address: usize, size: usize) -> Option<usize> {
        self.units(address, size)
            .find(|unit| self.occupied.contains(unit))
            .map(|unit| (unit * self.unit).max(address))
    }

    /// Mark the range occupied. Fails without modifying anything if any
    /// part of it already is, returning the first occupied address.
    pub fn reserve(&mut self, address: usize, size: usize) -> Result<(), usize> {
        if let Some(byte) = self.first_occupied(address, size) {
            return Err(byte);
        }
        let units = self.units(address, size);
        self.occupied.extend(units);
        Ok(())
    }

    /// Mark the range free, returning how many units were occupied.
    pub fn release(&mut self, address: usize, size: usize) -> usize {
        let units = self.units(address, size);
        units.filter(|unit| self.occupied.remove(unit)).count()
    }

    pub fn is_occupied(&self, address: usize) -> bool {
        self.occupied.contains(&(address / self.unit))
    }

    pub fn occupied_units(&self) -> usize {
        self.occupied.len()
    }

    pub fn clear(&mut self) {
        self.occupied.clear();
    }
}
