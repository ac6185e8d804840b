//! Live allocation registry.

use std::collections::HashMap;

/// One live allocation as the allocator handed it out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocationRecord {
    pub ptr: *mut u8,
    /// requested bytes, not the usable size
    pub size: usize,
}

impl AllocationRecord {
    pub fn new(ptr: *mut u8, size: usize) -> Self {
        AllocationRecord { ptr, size }
    }

    pub fn address(&self) -> usize {
        self.ptr as usize
    }
}

/// Live allocations in creation order, indexable for victim selection, plus
/// an address lookup.
#[derive(Default)]
pub struct Registry {
    order: Vec<AllocationRecord>,
    sizes: HashMap<usize, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn insert(&mut self, record: AllocationRecord) {
        let prev = self.sizes.insert(record.address(), record.size);
        debug_assert!(prev.is_none(), "{:p} registered twice", record.ptr);
        self.order.push(record);
    }

    /// The record at `index`.
    ///
    /// Panics if `index` is out of bounds.
    pub fn get(&self, index: usize) -> AllocationRecord {
        self.order[index]
    }

    pub fn size_of(&self, address: usize) -> Option<usize> {
        self.sizes.get(&address).copied()
    }

    /// Remove the record at `index`, keeping the order of the others.
    pub fn remove(&mut self, index: usize) -> AllocationRecord {
        let record = self.order.remove(index);
        self.sizes.remove(&record.address());
        record
    }

    /// Change the requested size of the record at `index` in place.
    pub fn resize(&mut self, index: usize, size: usize) {
        let record = &mut self.order[index];
        record.size = size;
        self.sizes.insert(record.address(), size);
    }

    pub fn iter(&self) -> impl Iterator<Item = AllocationRecord> + '_ {
        self.order.iter().copied()
    }

    /// Forget every record, newest first.
    pub fn drain(&mut self) -> impl Iterator<Item = AllocationRecord> + '_ {
        self.sizes.clear();
        self.order.drain(..).rev()
    }
}
