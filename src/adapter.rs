//! Allocator adapters.
//!
//! The harness talks to the allocator under test only through
//! [`AllocatorAdapter`], so a different allocator build can be fuzzed by
//! swapping the adapter.

use crate::config::DEFAULT_SCALAR_ALIGN;
use core::alloc::{GlobalAlloc, Layout};
use core::ptr;
use std::collections::HashMap;

/// malloc-family entry points of an allocator under test.
///
/// Null is the failure value everywhere, as in C.
pub trait AllocatorAdapter {
    fn allocate(&mut self, size: usize) -> *mut u8;

    /// `alignment` is a power of two no smaller than the scalar alignment.
    fn allocate_aligned(&mut self, alignment: usize, size: usize) -> *mut u8;

    /// # Safety
    ///
    /// `ptr` must have been returned by this adapter and not released since.
    unsafe fn deallocate(&mut self, ptr: *mut u8);

    /// # Safety
    ///
    /// `ptr` must have been returned by this adapter and not released since.
    /// The harness never passes a zero `new_size`.
    unsafe fn reallocate(&mut self, ptr: *mut u8, new_size: usize) -> *mut u8;

    /// # Safety
    ///
    /// `ptr` must have been returned by this adapter and not released since.
    unsafe fn usable_size(&self, ptr: *mut u8) -> usize;
}

/// The process's C allocator, reached through `libc`.
#[cfg(any(target_os = "linux", target_os = "macos"))]
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemMalloc;

#[cfg(any(target_os = "linux", target_os = "macos"))]
impl AllocatorAdapter for SystemMalloc {
    fn allocate(&mut self, size: usize) -> *mut u8 {
        unsafe { libc::malloc(size).cast() }
    }

    fn allocate_aligned(&mut self, alignment: usize, size: usize) -> *mut u8 {
        let mut out: *mut libc::c_void = ptr::null_mut();
        let rc = unsafe { libc::posix_memalign(&mut out, alignment, size) };
        if rc != 0 {
            log::debug!("posix_memalign({}, {}) failed with {}", alignment, size, rc);
            return ptr::null_mut();
        }
        out.cast()
    }

    unsafe fn deallocate(&mut self, ptr: *mut u8) {
        libc::free(ptr.cast());
    }

    unsafe fn reallocate(&mut self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        libc::realloc(ptr.cast(), new_size).cast()
    }

    #[cfg(target_os = "linux")]
    unsafe fn usable_size(&self, ptr: *mut u8) -> usize {
        libc::malloc_usable_size(ptr.cast())
    }

    #[cfg(target_os = "macos")]
    unsafe fn usable_size(&self, ptr: *mut u8) -> usize {
        libc::malloc_size(ptr as *const libc::c_void)
    }
}

/// Drives any [`GlobalAlloc`] as a malloc-style allocator.
///
/// `GlobalAlloc` needs the layout back on every call, so the adapter keeps
/// the layout of each block it handed out. The usable size it reports is
/// the layout size, which is all `GlobalAlloc` promises.
pub struct GlobalAllocAdapter<A: GlobalAlloc> {
    inner: A,
    align: usize,
    layouts: HashMap<usize, Layout>,
}

impl<A: GlobalAlloc> GlobalAllocAdapter<A> {
    pub fn new(inner: A) -> Self {
        Self::with_align(inner, DEFAULT_SCALAR_ALIGN)
    }

    /// `align` is the alignment of plain `allocate` requests.
    pub fn with_align(inner: A, align: usize) -> Self {
        GlobalAllocAdapter {
            inner,
            align: align.max(1).next_power_of_two(),
            layouts: HashMap::new(),
        }
    }

    /// Blocks handed out and not yet released.
    pub fn outstanding(&self) -> usize {
        self.layouts.len()
    }

    fn alloc_layout(&mut self, layout: Layout) -> *mut u8 {
        if layout.size() == 0 {
            return ptr::null_mut();
        }
        let ptr = unsafe { self.inner.alloc(layout) };
        if !ptr.is_null() {
            self.layouts.insert(ptr as usize, layout);
        }
        ptr
    }
}

impl<A: GlobalAlloc> AllocatorAdapter for GlobalAllocAdapter<A> {
    fn allocate(&mut self, size: usize) -> *mut u8 {
        match Layout::from_size_align(size, self.align) {
            Ok(layout) => self.alloc_layout(layout),
            Err(_) => ptr::null_mut(),
        }
    }

    fn allocate_aligned(&mut self, alignment: usize, size: usize) -> *mut u8 {
        match Layout::from_size_align(size, alignment) {
            Ok(layout) => self.alloc_layout(layout),
            Err(_) => ptr::null_mut(),
        }
    }

    unsafe fn deallocate(&mut self, ptr: *mut u8) {
        if let Some(layout) = self.layouts.remove(&(ptr as usize)) {
            self.inner.dealloc(ptr, layout);
        }
    }

    unsafe fn reallocate(&mut self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        let layout = match self.layouts.get(&(ptr as usize)) {
            Some(&layout) => layout,
            None => return ptr::null_mut(),
        };
        let new_layout = match Layout::from_size_align(new_size, layout.align()) {
            Ok(new_layout) if new_size > 0 => new_layout,
            _ => return ptr::null_mut(),
        };
        let new_ptr = self.inner.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            self.layouts.remove(&(ptr as usize));
            self.layouts.insert(new_ptr as usize, new_layout);
        }
        new_ptr
    }

    unsafe fn usable_size(&self, ptr: *mut u8) -> usize {
        self.layouts.get(&(ptr as usize)).map_or(0, Layout::size)
    }
}

impl<A: GlobalAlloc> Drop for GlobalAllocAdapter<A> {
    fn drop(&mut self) {
        for (address, layout) in self.layouts.drain() {
            unsafe { self.inner.dealloc(address as *mut u8, layout) };
        }
    }
}
