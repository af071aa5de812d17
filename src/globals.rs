//! Compile-time constants shared across the collector.
//!
//! These mirror the `#define`s scattered through `tredmill/internal.h` in the
//! original source: block size, header layout, and free-list bounds.

/// Alignment and size of an OS block. Must be a power of two and a multiple
/// of the host page size. One block is parceled into cells of a single
/// `Type`'s size.
pub const BLOCK_SIZE: usize = 1 << 16; // 64 KiB

/// Words reserved at the front of every cell for the (scratch) header,
/// mirroring `tm_node_HDR_SIZE` in the source. See `cell.rs` for why this
/// crate keeps the header as real bytes without reusing it as a list link.
pub const HEADER_WORDS: usize = 2;
pub const HEADER_SIZE: usize = HEADER_WORDS * std::mem::size_of::<usize>();

/// Minimum allocation granularity; cell sizes are rounded up to this.
pub const MIN_ALLOCATION: usize = 8;

/// Default number of recently-freed blocks of one size kept in the OS
/// allocator's cache before they are returned to the OS (`block_min_free`).
pub const DEFAULT_BLOCK_MIN_FREE: usize = 4;

/// Minimum number of allocations since the last sweep before the
/// memory-pressure heuristic is allowed to fire, preventing thrashing.
pub const MIN_ALLOCATIONS_SINCE_SWEEP: usize = 4;

/// The host's native page size, queried once and cached for the lifetime of
/// the process. `BLOCK_SIZE` is validated against this in
/// `TmConfig::validate` rather than assumed, since a block that isn't a
/// whole multiple of the page size would let `os_alloc`'s `mmap`/`VirtualAlloc`
/// calls hand back addresses the page bitmap can't index cleanly.
pub fn host_page_size() -> usize {
    page_size::get()
}
