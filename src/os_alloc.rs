//! OS Block Allocator
//!
//! Obtains and releases aligned, block-sized memory regions from the host
//! OS. Mirrors `fgc::heap::virtual_memory`'s reserve/commit split in spirit,
//! but collapsed to the single reserve-and-commit-at-once call the treadmill
//! design needs: every block handed to a `Type` is immediately usable.

use std::collections::HashMap;

use crate::error::{Result, TmError};
use crate::globals::BLOCK_SIZE;

/// A raw, OS-block-sized region. Not `Clone`/`Copy`: ownership transfers
/// explicitly through `alloc_aligned`/`free_aligned` so a region is never
/// accidentally mapped twice.
#[derive(Debug)]
pub struct OsBlock {
    pub ptr: *mut u8,
    pub size: usize,
}

// SAFETY: `OsBlock` is a bare handle to OS-owned memory; the collector is
// single-threaded (§5) so no concurrent access ever races on it, and moving
// the handle across the one mutator thread carries no extra hazard.
unsafe impl Send for OsBlock {}

impl OsBlock {
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }
}

/// Obtains and caches OS-level memory for blocks. Blocks beyond
/// `block_min_free` per distinct size are returned to the OS rather than
/// cached, matching §4.2's "free-list cache holds up to MIN_FREE...".
pub struct BlockAllocator {
    free_cache: HashMap<usize, Vec<OsBlock>>,
    block_min_free: usize,
    os_alloc_max: usize,
    bytes_obtained: usize,
}

impl BlockAllocator {
    pub fn new(os_alloc_max: usize, block_min_free: usize) -> Self {
        Self {
            free_cache: HashMap::new(),
            block_min_free,
            os_alloc_max,
            bytes_obtained: 0,
        }
    }

    pub fn bytes_obtained(&self) -> usize {
        self.bytes_obtained
    }

    pub fn cached_block_count(&self) -> usize {
        self.free_cache.values().map(|v| v.len()).sum()
    }

    /// Returns a region of exactly `size` bytes aligned to `BLOCK_SIZE`, or
    /// `Err(OutOfMemory)` if the soft ceiling would be exceeded or the OS
    /// refuses. Honors the ceiling *before* calling the OS (§4.2).
    pub fn alloc_aligned(&mut self, size: usize) -> Result<OsBlock> {
        if let Some(cached) = self.free_cache.get_mut(&size).and_then(|v| v.pop()) {
            return Ok(cached);
        }

        if self.bytes_obtained.saturating_add(size) > self.os_alloc_max {
            return Err(TmError::OutOfMemory {
                requested: size,
                available: self.os_alloc_max.saturating_sub(self.bytes_obtained),
            });
        }

        let region = os_mmap(size).ok_or(TmError::OutOfMemory {
            requested: size,
            available: self.os_alloc_max.saturating_sub(self.bytes_obtained),
        })?;

        let aligned = align_region(region, size)?;
        self.bytes_obtained += size;
        Ok(aligned)
    }

    pub fn free_aligned(&mut self, block: OsBlock) {
        let entry = self.free_cache.entry(block.size).or_default();
        if entry.len() < self.block_min_free {
            entry.push(block);
        } else {
            self.bytes_obtained = self.bytes_obtained.saturating_sub(block.size);
            os_munmap(block);
        }
    }
}

impl Drop for BlockAllocator {
    fn drop(&mut self) {
        for (_, blocks) in self.free_cache.drain() {
            for block in blocks {
                os_munmap(block);
            }
        }
    }
}

/// Requests a region of `size` bytes from the OS, aligned to `BLOCK_SIZE`.
///
/// Implementation contract (§4.2): if the OS returns a non-aligned region,
/// free it, request `size + BLOCK_SIZE - 1` bytes, and trim the leading
/// slack. In practice every platform below returns page-aligned memory and
/// `BLOCK_SIZE` is a multiple of the page size, so the retry path is dead on
/// these targets today; it is kept because a future platform's allocator
/// (or a smaller `BLOCK_SIZE`) could violate that assumption, and the
/// contract is part of the specified behavior, not an implementation detail.
fn align_region(region: OsBlock, size: usize) -> Result<OsBlock> {
    if region.ptr as usize % BLOCK_SIZE == 0 {
        return Ok(region);
    }

    os_munmap(region);
    let oversized = os_mmap(size + BLOCK_SIZE - 1).ok_or(TmError::OutOfMemory {
        requested: size + BLOCK_SIZE - 1,
        available: 0,
    })?;
    let base = oversized.ptr as usize;
    let aligned_base = (base + BLOCK_SIZE - 1) & !(BLOCK_SIZE - 1);
    let slack = aligned_base - base;
    debug_assert!(slack < BLOCK_SIZE);
    Ok(OsBlock {
        ptr: (aligned_base) as *mut u8,
        size,
    })
}

#[cfg(unix)]
fn os_mmap(size: usize) -> Option<OsBlock> {
    unsafe {
        let ptr = libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANON,
            -1,
            0,
        );
        if ptr == libc::MAP_FAILED {
            return None;
        }
        Some(OsBlock {
            ptr: ptr as *mut u8,
            size,
        })
    }
}

#[cfg(unix)]
fn os_munmap(block: OsBlock) {
    unsafe {
        libc::munmap(block.ptr as *mut libc::c_void, block.size);
    }
}

#[cfg(windows)]
fn os_mmap(size: usize) -> Option<OsBlock> {
    use windows_sys::Win32::System::Memory::{VirtualAlloc, MEM_COMMIT, MEM_RESERVE, PAGE_READWRITE};
    unsafe {
        let ptr = VirtualAlloc(std::ptr::null(), size, MEM_RESERVE | MEM_COMMIT, PAGE_READWRITE);
        if ptr.is_null() {
            return None;
        }
        Some(OsBlock {
            ptr: ptr as *mut u8,
            size,
        })
    }
}

#[cfg(windows)]
fn os_munmap(block: OsBlock) {
    use windows_sys::Win32::System::Memory::{VirtualFree, MEM_RELEASE};
    unsafe {
        VirtualFree(block.ptr as *mut _, 0, MEM_RELEASE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_free_round_trips_through_cache() {
        let mut alloc = BlockAllocator::new(16 * BLOCK_SIZE, 2);
        let a = alloc.alloc_aligned(BLOCK_SIZE).unwrap();
        assert_eq!(a.ptr as usize % BLOCK_SIZE, 0);
        alloc.free_aligned(a);
        assert_eq!(alloc.cached_block_count(), 1);

        let b = alloc.alloc_aligned(BLOCK_SIZE).unwrap();
        assert_eq!(alloc.cached_block_count(), 0);
        alloc.free_aligned(b);
    }

    #[test]
    fn soft_ceiling_is_honored() {
        let mut alloc = BlockAllocator::new(BLOCK_SIZE, 2);
        let _first = alloc.alloc_aligned(BLOCK_SIZE).unwrap();
        let second = alloc.alloc_aligned(BLOCK_SIZE);
        assert!(second.is_err());
    }

    #[test]
    fn free_list_cache_bounds_at_block_min_free() {
        let mut alloc = BlockAllocator::new(16 * BLOCK_SIZE, 1);
        let a = alloc.alloc_aligned(BLOCK_SIZE).unwrap();
        let b = alloc.alloc_aligned(BLOCK_SIZE).unwrap();
        alloc.free_aligned(a);
        alloc.free_aligned(b);
        assert_eq!(alloc.cached_block_count(), 1);
    }
}
