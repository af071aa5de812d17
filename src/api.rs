//! Public Allocation API
//!
//! Mirrors `original_source/tm.h`'s surface (`tm_alloc`/`tm_realloc`/
//! `tm_free`/`tm_root_add`/the three write-barrier hooks) as safe Rust
//! functions over a process-wide [`GcHandle`] singleton, the way a C
//! library's single global allocator would be used. Programs that want
//! several independent heaps should construct their own [`GcHandle`]
//! directly instead of going through this module.

use lazy_static::lazy_static;

use crate::config::TmConfig;
use crate::error::Result;
use crate::heap::{Allocation, GcHandle};
use crate::roots::RootCallbackFn;

lazy_static! {
    static ref DEFAULT_HEAP: GcHandle =
        GcHandle::new(TmConfig::default()).expect("default TmConfig must validate");
}

/// Returns the process-wide default heap, lazily initialized on first use.
pub fn default_heap() -> &'static GcHandle {
    &DEFAULT_HEAP
}

/// Allocates `size` bytes from the default heap. Mirrors `tm_alloc`.
pub fn tm_alloc(size: usize) -> Result<Allocation> {
    default_heap().alloc(size)
}

/// Explicitly frees an allocation from the default heap. Mirrors `tm_free`.
///
/// Not required for correctness -- an unfreed, unreferenced cell is
/// eventually reclaimed by the collector -- but lets a caller that knows an
/// allocation is dead return it to the free list immediately.
pub fn tm_free(alloc: Allocation) {
    default_heap().free(alloc)
}

/// Reallocates `old` to hold at least `size` bytes from the default heap.
/// Mirrors `tm_realloc`: `old == None` behaves like `tm_alloc`, `size == 0`
/// behaves like `tm_free` and returns `None`.
pub fn tm_realloc(old: Option<Allocation>, size: usize) -> Result<Option<Allocation>> {
    default_heap().realloc(old, size)
}

/// Forces a complete, synchronous collection cycle on the default heap.
/// Mirrors `tm_gc_full`.
pub fn tm_gc_full() {
    default_heap().gc_full()
}

/// Registers `[begin, end)` as a root range scanned every cycle. Mirrors
/// `tm_root_add`.
pub fn tm_root_add(begin: usize, end: usize, name: &'static str) -> Result<()> {
    default_heap().with_state(|gs| gs.add_root(begin, end, name))
}

/// Unregisters a previously added root range. Mirrors `tm_root_remove`.
pub fn tm_root_remove(begin: usize, end: usize) -> Result<()> {
    default_heap().with_state(|gs| gs.remove_root(begin, end))
}

/// Registers a root whose range is recomputed by `callback(data)` on every
/// scan, for ranges that move (e.g. a thread's current stack bounds).
/// Mirrors the callback half of `tm_root_add`.
pub fn tm_root_add_callback(name: &'static str, callback: RootCallbackFn, data: *mut std::ffi::c_void) {
    default_heap().with_state(|gs| gs.add_root_callback(name, callback, data));
}

/// Unregisters a previously added callback root by name. Mirrors
/// `tm_root_remove`'s callback half.
pub fn tm_root_remove_callback(name: &'static str) {
    default_heap().with_state(|gs| gs.remove_root_callback(name));
}

/// Registers `[begin, end)` as an anti-root, excluded from every root range
/// it overlaps. Mirrors the anti-root half of `root.c`.
pub fn tm_anti_root_add(begin: usize, end: usize) -> Result<()> {
    default_heap().with_state(|gs| gs.add_anti_root(begin, end))
}

/// Write barrier hook for a pointer known to point directly at a
/// `tm_alloc`'ed cell's payload. Mirrors `tm_write_barrier_pure`.
pub fn tm_write_barrier_pure(alloc: Allocation) {
    default_heap().with_state(|gs| gs.write_barrier_pure(alloc));
}

/// Write barrier hook for a write into a root location (stack or static).
/// Mirrors `tm_write_root`.
pub fn tm_write_root(written_value: usize) {
    default_heap().with_state(|gs| gs.write_barrier_root(written_value));
}

/// General write barrier hook for a write whose target is not otherwise
/// known to be a root or a pure cell pointer. Mirrors `tm_write_barrier`.
pub fn tm_write_barrier(addr: usize) {
    default_heap().with_state(|gs| gs.write_barrier_general(addr));
}

/// `malloc`/`calloc`/`realloc`/`free` compatibility shim over the default
/// heap, mirroring `original_source/malloc.c`. Every entry point other than
/// `tm_malloc` works from a raw address alone: the owning `Allocation` is
/// recovered through the same conservative classifier the collector uses on
/// roots, not a parallel bookkeeping table, since a `void*` carries no
/// identifying information of its own.
pub mod compat {
    use std::os::raw::c_void;

    use super::{default_heap, tm_alloc};
    use crate::heap::Allocation;

    fn resolve(ptr: *mut c_void) -> Option<Allocation> {
        if ptr.is_null() {
            return None;
        }
        default_heap().resolve_allocation(ptr as usize)
    }

    /// Mirrors `malloc`. Returns null on allocation failure, matching libc.
    #[no_mangle]
    pub extern "C" fn tm_malloc(size: usize) -> *mut c_void {
        match tm_alloc(size) {
            Ok(a) => a.ptr as *mut c_void,
            Err(_) => std::ptr::null_mut(),
        }
    }

    /// Mirrors `calloc`: `nmemb * size` bytes, zeroed. Returns null on
    /// overflow or allocation failure.
    #[no_mangle]
    pub extern "C" fn tm_calloc(nmemb: usize, size: usize) -> *mut c_void {
        let total = match nmemb.checked_mul(size) {
            Some(t) => t,
            None => return std::ptr::null_mut(),
        };
        match tm_alloc(total) {
            Ok(a) => {
                unsafe { std::ptr::write_bytes(a.ptr, 0, total) };
                a.ptr as *mut c_void
            }
            Err(_) => std::ptr::null_mut(),
        }
    }

    /// Mirrors `realloc`. `ptr == NULL` behaves like `malloc`; `size == 0`
    /// behaves like `free` and returns null.
    #[no_mangle]
    pub extern "C" fn tm_realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
        let old = resolve(ptr);
        match default_heap().realloc(old, size) {
            Ok(Some(a)) => a.ptr as *mut c_void,
            Ok(None) | Err(_) => std::ptr::null_mut(),
        }
    }

    /// Mirrors `free`. A null or unrecognized pointer is a no-op, matching
    /// libc's tolerance of `free(NULL)`.
    #[no_mangle]
    pub extern "C" fn tm_free(ptr: *mut c_void) {
        if let Some(a) = resolve(ptr) {
            super::tm_free(a);
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn malloc_then_free_round_trips() {
            let ptr = tm_malloc(48);
            assert!(!ptr.is_null());
            tm_free(ptr);
        }

        #[test]
        fn calloc_zeroes_its_memory() {
            let ptr = tm_calloc(4, 8) as *mut u8;
            assert!(!ptr.is_null());
            for i in 0..32 {
                assert_eq!(unsafe { *ptr.add(i) }, 0);
            }
            tm_free(ptr as *mut c_void);
        }

        #[test]
        fn realloc_of_null_behaves_like_malloc() {
            let ptr = tm_realloc(std::ptr::null_mut(), 16);
            assert!(!ptr.is_null());
            tm_free(ptr);
        }

        #[test]
        fn realloc_to_zero_behaves_like_free_and_returns_null() {
            let ptr = tm_malloc(16);
            let result = tm_realloc(ptr, 0);
            assert!(result.is_null());
        }

        #[test]
        fn free_of_null_is_a_no_op() {
            tm_free(std::ptr::null_mut());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_heap_allocates_and_frees() {
        let a = tm_alloc(32).unwrap();
        assert!(!a.ptr.is_null());
        tm_free(a);
    }

    #[test]
    fn root_and_anti_root_registration_succeed() {
        let stack_var = 0usize;
        let base = &stack_var as *const usize as usize;
        tm_root_add(base, base + 8, "test-root").unwrap();
        tm_anti_root_add(base, base + 4).unwrap();
    }

    #[test]
    fn root_remove_stops_a_range_from_being_scanned() {
        let stack_var = 0usize;
        let base = &stack_var as *const usize as usize;
        tm_root_add(base, base + 8, "removable-root").unwrap();
        tm_root_remove(base, base + 8).unwrap();
    }

    #[test]
    fn gc_handle_exposes_realloc_and_gc_full() {
        // A private heap, not the process-wide singleton other tests in
        // this module share, since forcing full collection cycles here
        // would otherwise race with allocations those tests are mid-way
        // through.
        let handle = GcHandle::new(TmConfig::default()).unwrap();
        let a = handle.realloc(None, 24).unwrap().unwrap();
        assert!(!a.ptr.is_null());
        handle.gc_full();
        handle.gc_full();
        let freed = handle.realloc(Some(a), 0).unwrap();
        assert!(freed.is_none());
    }
}
