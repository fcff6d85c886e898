//! Backing-store allocation for array buffers.
//!
//! [`ForeignAllocator`] adapts an embedder's function table. Each entry gets a "super"
//! continuation so the embedder can wrap the default behaviour instead of replacing it, e.g. to
//! account for memory and then delegate.

use crate::enums::{AllocationMode, Protection};
use log::debug;
use std::alloc::{self, Layout};
use std::ffi::c_void;
use std::ptr;

const ALIGNMENT: usize = 16;

pub trait ArrayBufferAllocator: Send + Sync {
    /// Allocates `length` zeroed bytes.
    fn allocate(&self, length: usize) -> *mut c_void;

    /// Allocates `length` bytes without initializing them.
    fn allocate_uninitialized(&self, length: usize) -> *mut c_void;

    /// Reserves `length` bytes of address space for later use.
    fn reserve(&self, length: usize) -> *mut c_void;

    fn free(&self, data: *mut c_void, length: usize);

    fn free_mode(&self, data: *mut c_void, length: usize, mode: AllocationMode);

    fn set_protection(&self, data: *mut c_void, length: usize, protection: Protection) -> bool;
}

pub type AllocatorPtr = *mut Box<dyn ArrayBufferAllocator>;

fn layout(length: usize) -> Option<Layout> {
    Layout::from_size_align(length.max(1), ALIGNMENT).ok()
}

/// Heap allocation through the global allocator.
#[derive(Debug, Default)]
pub struct DefaultAllocator;

impl ArrayBufferAllocator for DefaultAllocator {
    fn allocate(&self, length: usize) -> *mut c_void {
        match layout(length) {
            Some(layout) => unsafe { alloc::alloc_zeroed(layout) as *mut c_void },
            None => ptr::null_mut(),
        }
    }

    fn allocate_uninitialized(&self, length: usize) -> *mut c_void {
        match layout(length) {
            Some(layout) => unsafe { alloc::alloc(layout) as *mut c_void },
            None => ptr::null_mut(),
        }
    }

    // heap blocks are committed on allocation, so a reservation is a plain block
    fn reserve(&self, length: usize) -> *mut c_void {
        self.allocate_uninitialized(length)
    }

    fn free(&self, data: *mut c_void, length: usize) {
        if data.is_null() {
            return;
        }
        if let Some(layout) = layout(length) {
            unsafe { alloc::dealloc(data as *mut u8, layout) };
        }
    }

    fn free_mode(&self, data: *mut c_void, length: usize, _mode: AllocationMode) {
        self.free(data, length)
    }

    // page protection does not apply to heap blocks
    fn set_protection(&self, _data: *mut c_void, _length: usize, _protection: Protection) -> bool {
        true
    }
}

pub type SuperAllocate = unsafe extern "C" fn(super_data: *mut c_void, length: usize) -> *mut c_void;
pub type SuperFree = unsafe extern "C" fn(super_data: *mut c_void, data: *mut c_void, length: usize);
pub type SuperFreeMode = unsafe extern "C" fn(
    super_data: *mut c_void,
    data: *mut c_void,
    length: usize,
    mode: AllocationMode,
);
pub type SuperSetProtection = unsafe extern "C" fn(
    super_data: *mut c_void,
    data: *mut c_void,
    length: usize,
    protection: Protection,
) -> bool;
pub type SuperDestroy = unsafe extern "C" fn(super_data: *mut c_void);

pub type AllocateFn = unsafe extern "C" fn(
    data: *mut c_void,
    super_fn: SuperAllocate,
    super_data: *mut c_void,
    length: usize,
) -> *mut c_void;

/// Allocation entry points supplied by the embedder. Every entry receives the table's `data`
/// pointer plus a continuation (`super_fn`, `super_data`) into the default allocator. A null entry
/// goes straight to the default.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct AllocatorFunctions {
    pub allocate: Option<AllocateFn>,
    pub allocate_uninitialized: Option<AllocateFn>,
    pub reserve: Option<AllocateFn>,
    pub free: Option<
        unsafe extern "C" fn(
            data: *mut c_void,
            super_fn: SuperFree,
            super_data: *mut c_void,
            ptr: *mut c_void,
            length: usize,
        ),
    >,
    pub free_mode: Option<
        unsafe extern "C" fn(
            data: *mut c_void,
            super_fn: SuperFreeMode,
            super_data: *mut c_void,
            ptr: *mut c_void,
            length: usize,
            mode: AllocationMode,
        ),
    >,
    pub set_protection: Option<
        unsafe extern "C" fn(
            data: *mut c_void,
            super_fn: SuperSetProtection,
            super_data: *mut c_void,
            ptr: *mut c_void,
            length: usize,
            protection: Protection,
        ) -> bool,
    >,
    pub destroy:
        Option<unsafe extern "C" fn(data: *mut c_void, super_fn: SuperDestroy, super_data: *mut c_void)>,
}

/// An [`ArrayBufferAllocator`] forwarding to an embedder's function table.
pub struct ForeignAllocator {
    functions: AllocatorFunctions,
    data: *mut c_void,
    fallback: Option<Box<DefaultAllocator>>,
}

// The embedder guarantees its table may be called from any thread.
unsafe impl Send for ForeignAllocator {}
unsafe impl Sync for ForeignAllocator {}

unsafe extern "C" fn super_allocate(super_data: *mut c_void, length: usize) -> *mut c_void {
    (*(super_data as *const DefaultAllocator)).allocate(length)
}

unsafe extern "C" fn super_allocate_uninitialized(
    super_data: *mut c_void,
    length: usize,
) -> *mut c_void {
    (*(super_data as *const DefaultAllocator)).allocate_uninitialized(length)
}

unsafe extern "C" fn super_reserve(super_data: *mut c_void, length: usize) -> *mut c_void {
    (*(super_data as *const DefaultAllocator)).reserve(length)
}

unsafe extern "C" fn super_free(super_data: *mut c_void, data: *mut c_void, length: usize) {
    (*(super_data as *const DefaultAllocator)).free(data, length)
}

unsafe extern "C" fn super_free_mode(
    super_data: *mut c_void,
    data: *mut c_void,
    length: usize,
    mode: AllocationMode,
) {
    (*(super_data as *const DefaultAllocator)).free_mode(data, length, mode)
}

unsafe extern "C" fn super_set_protection(
    super_data: *mut c_void,
    data: *mut c_void,
    length: usize,
    protection: Protection,
) -> bool {
    (*(super_data as *const DefaultAllocator)).set_protection(data, length, protection)
}

unsafe extern "C" fn super_destroy(super_data: *mut c_void) {
    (*(super_data as *mut Option<Box<DefaultAllocator>>)).take();
}

impl ForeignAllocator {
    /// # Safety
    ///
    /// Every entry in `functions` must be safe to call with `data` from any thread until the
    /// allocator is dropped.
    pub unsafe fn new(functions: AllocatorFunctions, data: *mut c_void) -> Self {
        ForeignAllocator {
            functions,
            data,
            fallback: Some(Box::new(DefaultAllocator)),
        }
    }

    fn super_data(&self) -> *mut c_void {
        match &self.fallback {
            Some(fallback) => &**fallback as *const DefaultAllocator as *mut c_void,
            None => ptr::null_mut(),
        }
    }

    fn forward_allocate(
        &self,
        entry: Option<AllocateFn>,
        super_fn: SuperAllocate,
        length: usize,
    ) -> *mut c_void {
        let super_data = self.super_data();
        match entry {
            Some(f) => unsafe { f(self.data, super_fn, super_data, length) },
            None => unsafe { super_fn(super_data, length) },
        }
    }
}

impl ArrayBufferAllocator for ForeignAllocator {
    fn allocate(&self, length: usize) -> *mut c_void {
        self.forward_allocate(self.functions.allocate, super_allocate, length)
    }

    fn allocate_uninitialized(&self, length: usize) -> *mut c_void {
        self.forward_allocate(
            self.functions.allocate_uninitialized,
            super_allocate_uninitialized,
            length,
        )
    }

    fn reserve(&self, length: usize) -> *mut c_void {
        self.forward_allocate(self.functions.reserve, super_reserve, length)
    }

    fn free(&self, data: *mut c_void, length: usize) {
        let super_data = self.super_data();
        match self.functions.free {
            Some(f) => unsafe { f(self.data, super_free, super_data, data, length) },
            None => unsafe { super_free(super_data, data, length) },
        }
    }

    fn free_mode(&self, data: *mut c_void, length: usize, mode: AllocationMode) {
        let super_data = self.super_data();
        match self.functions.free_mode {
            Some(f) => unsafe { f(self.data, super_free_mode, super_data, data, length, mode) },
            None => unsafe { super_free_mode(super_data, data, length, mode) },
        }
    }

    fn set_protection(&self, data: *mut c_void, length: usize, protection: Protection) -> bool {
        let super_data = self.super_data();
        match self.functions.set_protection {
            Some(f) => unsafe {
                f(
                    self.data,
                    super_set_protection,
                    super_data,
                    data,
                    length,
                    protection,
                )
            },
            None => unsafe { super_set_protection(super_data, data, length, protection) },
        }
    }
}

impl Drop for ForeignAllocator {
    fn drop(&mut self) {
        // embedder state goes first; its continuation may already release the fallback
        if let Some(destroy) = self.functions.destroy {
            let super_data = &mut self.fallback as *mut Option<Box<DefaultAllocator>> as *mut c_void;
            unsafe { destroy(self.data, super_destroy, super_data) };
        }
        self.fallback.take();
        debug!("foreign allocator destroyed");
    }
}

/// Wrapper the engine holds on to. Dropped by the engine once no isolate and no backing store
/// uses it any longer.
struct EngineAllocator(Box<dyn ArrayBufferAllocator>);

unsafe extern "C" fn engine_allocate(handle: &EngineAllocator, length: usize) -> *mut c_void {
    handle.0.allocate(length)
}

unsafe extern "C" fn engine_allocate_uninitialized(
    handle: &EngineAllocator,
    length: usize,
) -> *mut c_void {
    handle.0.allocate_uninitialized(length)
}

unsafe extern "C" fn engine_free(handle: &EngineAllocator, data: *mut c_void, length: usize) {
    handle.0.free(data, length)
}

unsafe extern "C" fn engine_reallocate(
    handle: &EngineAllocator,
    data: *mut c_void,
    old_length: usize,
    new_length: usize,
) -> *mut c_void {
    let moved = handle.0.allocate_uninitialized(new_length);
    if moved.is_null() {
        return moved;
    }
    let kept = old_length.min(new_length);
    if !data.is_null() && kept > 0 {
        ptr::copy_nonoverlapping(data as *const u8, moved as *mut u8, kept);
    }
    if new_length > kept {
        ptr::write_bytes((moved as *mut u8).add(kept), 0, new_length - kept);
    }
    handle.0.free(data, old_length);
    moved
}

unsafe extern "C" fn engine_drop(handle: *const EngineAllocator) {
    drop(Box::from_raw(handle as *mut EngineAllocator));
}

static ENGINE_VTABLE: v8::RustAllocatorVtable<EngineAllocator> = v8::RustAllocatorVtable {
    allocate: engine_allocate,
    allocate_uninitialized: engine_allocate_uninitialized,
    free: engine_free,
    reallocate: engine_reallocate,
    drop: engine_drop,
};

/// Hands an allocator to the engine, which owns it from then on.
pub fn into_engine(allocator: Box<dyn ArrayBufferAllocator>) -> v8::SharedRef<v8::Allocator> {
    let handle = Box::into_raw(Box::new(EngineAllocator(allocator)));
    unsafe { v8::new_rust_allocator(handle as *const EngineAllocator, &ENGINE_VTABLE) }.make_shared()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        allocations: AtomicUsize,
        frees: AtomicUsize,
        destroyed_before_fallback: AtomicUsize,
    }

    unsafe extern "C" fn counting_allocate(
        data: *mut c_void,
        super_fn: SuperAllocate,
        super_data: *mut c_void,
        length: usize,
    ) -> *mut c_void {
        let counters = &*(data as *const Counters);
        counters.allocations.fetch_add(1, Ordering::SeqCst);
        super_fn(super_data, length)
    }

    unsafe extern "C" fn counting_free(
        data: *mut c_void,
        super_fn: SuperFree,
        super_data: *mut c_void,
        ptr: *mut c_void,
        length: usize,
    ) {
        let counters = &*(data as *const Counters);
        counters.frees.fetch_add(1, Ordering::SeqCst);
        super_fn(super_data, ptr, length)
    }

    unsafe extern "C" fn checking_destroy(
        data: *mut c_void,
        super_fn: SuperDestroy,
        super_data: *mut c_void,
    ) {
        let counters = &*(data as *const Counters);
        if (*(super_data as *const Option<Box<DefaultAllocator>>)).is_some() {
            counters
                .destroyed_before_fallback
                .fetch_add(1, Ordering::SeqCst);
        }
        super_fn(super_data);
    }

    #[test]
    fn free_only_table_allocates_through_default() {
        let counters = Counters::default();
        let functions = AllocatorFunctions {
            free: Some(counting_free),
            ..Default::default()
        };
        let allocator =
            unsafe { ForeignAllocator::new(functions, &counters as *const Counters as *mut c_void) };

        let zeroed = allocator.allocate(16);
        let raw = allocator.allocate_uninitialized(16);
        let reserved = allocator.reserve(16);
        assert!(!zeroed.is_null() && !raw.is_null() && !reserved.is_null());
        assert_eq!(0, counters.allocations.load(Ordering::SeqCst));

        allocator.free(zeroed, 16);
        allocator.free(raw, 16);
        allocator.free(reserved, 16);
        assert_eq!(3, counters.frees.load(Ordering::SeqCst));
    }

    #[test]
    fn default_allocation_is_zeroed() {
        let allocator = DefaultAllocator;
        let data = allocator.allocate(64);
        assert!(!data.is_null());
        let bytes = unsafe { std::slice::from_raw_parts(data as *const u8, 64) };
        assert!(bytes.iter().all(|b| *b == 0));
        allocator.free(data, 64);
    }

    #[test]
    fn foreign_entries_delegate_through_super() {
        let counters = Counters::default();
        let functions = AllocatorFunctions {
            allocate: Some(counting_allocate),
            free: Some(counting_free),
            destroy: Some(checking_destroy),
            ..Default::default()
        };
        let allocator =
            unsafe { ForeignAllocator::new(functions, &counters as *const Counters as *mut c_void) };

        let data = allocator.allocate(32);
        assert!(!data.is_null());
        let bytes = unsafe { std::slice::from_raw_parts(data as *const u8, 32) };
        assert!(bytes.iter().all(|b| *b == 0));
        allocator.free(data, 32);

        // absent entries go straight to the default
        let raw = allocator.allocate_uninitialized(8);
        assert!(!raw.is_null());
        allocator.free_mode(raw, 8, AllocationMode::Normal);
        assert!(allocator.set_protection(ptr::null_mut(), 0, Protection::ReadWrite));

        assert_eq!(1, counters.allocations.load(Ordering::SeqCst));
        assert_eq!(1, counters.frees.load(Ordering::SeqCst));

        drop(allocator);
        assert_eq!(1, counters.destroyed_before_fallback.load(Ordering::SeqCst));
    }
}
