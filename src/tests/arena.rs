//! Bump allocator over a private buffer with injectable contract breaches.

use crate::adapter::AllocatorAdapter;
use std::collections::HashMap;

const ARENA_SIZE: usize = 4 << 20;
const SLOT_ALIGN: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Defect {
    None,
    /// allocation `n` (0-based) reuses the address of allocation `n - 1`
    Overlap(usize),
    /// blocks start one byte past an aligned slot
    Misalign,
    /// usable size is reported one byte short
    ShortUsable,
    /// realloc always moves and copies nothing
    DropContent,
    /// allocation `n` bumps the first byte of the first block
    Stomp(usize),
    /// every request fails
    Exhausted,
    /// blocks are packed back to back with no slot padding
    Packed,
    /// realloc copies the contents onto the first live block and returns it
    ReallocOnto,
    /// blocks produced by realloc report a usable size one byte short
    ShortAfterRealloc,
    /// realloc always moves, to one byte past an aligned slot
    MisalignOnRealloc,
    /// realloc fails while allocation still works
    ReallocNull,
}

#[derive(Clone, Copy)]
struct Block {
    size: usize,
    capacity: usize,
    /// produced by a realloc
    resized: bool,
}

pub struct Arena {
    buf: Vec<u128>,
    next: usize,
    blocks: HashMap<usize, Block>,
    defect: Defect,
    allocations: usize,
    first: Option<usize>,
    last: Option<usize>,
    pub freed: usize,
}

fn round_up(n: usize, align: usize) -> usize {
    (n + align - 1) / align * align
}

impl Arena {
    pub fn new(defect: Defect) -> Self {
        Arena {
            buf: vec![0u128; ARENA_SIZE / 16],
            next: 0,
            blocks: HashMap::new(),
            defect,
            allocations: 0,
            first: None,
            last: None,
            freed: 0,
        }
    }

    fn base(&self) -> usize {
        self.buf.as_ptr() as usize
    }

    fn at(&mut self, address: usize) -> *mut u8 {
        let offset = address - self.base();
        unsafe { (self.buf.as_mut_ptr() as *mut u8).add(offset) }
    }

    /// carve a fresh slot of at least `size` bytes aligned to `align`,
    /// starting `skew` bytes into it
    fn carve(&mut self, align: usize, size: usize, skew: usize) -> *mut u8 {
        let slot = if self.defect == Defect::Packed {
            1
        } else {
            SLOT_ALIGN
        };
        let base = self.base();
        let start = round_up(base + self.next, align.max(slot)) - base;
        let capacity = round_up(size.max(1) + skew, slot) - skew;
        if start + skew + capacity > ARENA_SIZE {
            return core::ptr::null_mut();
        }
        self.next = start + skew + capacity;
        let ptr = unsafe { (self.buf.as_mut_ptr() as *mut u8).add(start + skew) };
        self.blocks.insert(
            ptr as usize,
            Block {
                size,
                capacity,
                resized: false,
            },
        );
        ptr
    }

    fn hand_out(&mut self, align: usize, size: usize) -> *mut u8 {
        if self.defect == Defect::Exhausted {
            return core::ptr::null_mut();
        }
        let n = self.allocations;
        self.allocations += 1;

        if let Defect::Stomp(at) = self.defect {
            if at == n {
                if let Some(first) = self.first.filter(|a| self.blocks.contains_key(a)) {
                    let byte = self.at(first);
                    unsafe { byte.write(byte.read().wrapping_add(1)) };
                }
            }
        }

        let ptr = match (self.defect, self.last) {
            (Defect::Overlap(at), Some(last)) if at == n => {
                let offset = last - self.base();
                let block = self.blocks[&last];
                let capacity = block.capacity.max(round_up(size, SLOT_ALIGN));
                self.next = self.next.max(offset + capacity);
                self.blocks.insert(
                    last,
                    Block {
                        size,
                        capacity,
                        resized: false,
                    },
                );
                self.at(last)
            }
            _ => {
                let skew = if self.defect == Defect::Misalign { 1 } else { 0 };
                self.carve(align, size, skew)
            }
        };
        if !ptr.is_null() {
            self.first.get_or_insert(ptr as usize);
            self.last = Some(ptr as usize);
        }
        ptr
    }

    pub fn live(&self) -> usize {
        self.blocks.len()
    }
}

impl AllocatorAdapter for Arena {
    fn allocate(&mut self, size: usize) -> *mut u8 {
        self.hand_out(1, size)
    }

    fn allocate_aligned(&mut self, alignment: usize, size: usize) -> *mut u8 {
        self.hand_out(alignment, size)
    }

    unsafe fn deallocate(&mut self, ptr: *mut u8) {
        if self.blocks.remove(&(ptr as usize)).is_some() {
            self.freed += 1;
        }
    }

    unsafe fn reallocate(&mut self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        if matches!(self.defect, Defect::Exhausted | Defect::ReallocNull) {
            return core::ptr::null_mut();
        }
        let block = match self.blocks.get(&(ptr as usize)) {
            Some(&block) => block,
            None => return core::ptr::null_mut(),
        };

        if self.defect == Defect::ReallocOnto {
            let onto = self
                .first
                .filter(|&a| a != ptr as usize && self.blocks.contains_key(&a));
            if let Some(onto) = onto {
                let onto_ptr = self.at(onto);
                core::ptr::copy_nonoverlapping(ptr, onto_ptr, block.size.min(new_size));
                self.blocks.remove(&(ptr as usize));
                return onto_ptr;
            }
        }

        let moves = matches!(self.defect, Defect::DropContent | Defect::MisalignOnRealloc);
        if !moves && new_size <= block.capacity {
            self.blocks.insert(
                ptr as usize,
                Block {
                    size: new_size,
                    capacity: block.capacity,
                    resized: true,
                },
            );
            return ptr;
        }
        let skew = if self.defect == Defect::MisalignOnRealloc {
            1
        } else {
            0
        };
        let new_ptr = self.carve(1, new_size, skew);
        if new_ptr.is_null() {
            return new_ptr;
        }
        if self.defect != Defect::DropContent {
            core::ptr::copy_nonoverlapping(ptr, new_ptr, block.size.min(new_size));
        }
        if let Some(new_block) = self.blocks.get_mut(&(new_ptr as usize)) {
            new_block.resized = true;
        }
        self.blocks.remove(&(ptr as usize));
        new_ptr
    }

    unsafe fn usable_size(&self, ptr: *mut u8) -> usize {
        match self.blocks.get(&(ptr as usize)) {
            Some(block) if self.defect == Defect::ShortUsable => block.size.saturating_sub(1),
            Some(block) if self.defect == Defect::ShortAfterRealloc && block.resized => {
                block.size.saturating_sub(1)
            }
            Some(block) => block.capacity,
            None => 0,
        }
    }
}
