//! Block - a single OS-allocated region parceled into cells of one size.
//!
//! Corresponds to `tm_block` in the original source. Where the source links
//! blocks into a list through an embedded header, this crate indexes them by
//! position in `Type::blocks`, referenced everywhere as a `BlockId`.

use crate::cell::{CellMeta, CellRef};
use crate::globals::HEADER_SIZE;
use crate::os_alloc::OsBlock;

/// Index of a `Block` within its owning `Type`'s block vector.
pub type BlockId = usize;

/// Lifecycle of a block, tracked so the sweeper and the OS allocator agree on
/// when a block's memory may be reused or handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// Freshly obtained from the OS, no cells parceled yet.
    Uninitialized,
    /// Some cells have been parceled onto the WHITE list; more capacity remains.
    Parceling,
    /// Fully parceled and holding at least one live (non-WHITE-free) cell.
    Live,
    /// Every cell swept back to WHITE; eligible for reclaim to the OS allocator.
    Reclaimable,
}

/// One OS block's worth of cells for a single `Type`.
pub struct Block {
    memory: OsBlock,
    /// Size in bytes of one cell, including `HEADER_SIZE`.
    stride: usize,
    /// Total number of cell slots this block can hold.
    capacity: u32,
    /// Number of slots parceled onto the treadmill so far (`Parceling` cursor).
    parceled: u32,
    /// Per-slot metadata, parallel to the raw memory.
    meta: Vec<CellMeta>,
    /// Count of cells currently tagged with each of the four physical colors.
    color_counts: [u32; 4],
    state: BlockState,
}

impl Block {
    pub fn new(memory: OsBlock, stride: usize) -> Self {
        let capacity = (memory.size / stride) as u32;
        Self {
            memory,
            stride,
            capacity,
            parceled: 0,
            meta: Vec::with_capacity(capacity as usize),
            color_counts: [0; 4],
            state: BlockState::Uninitialized,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn parceled(&self) -> u32 {
        self.parceled
    }

    pub fn state(&self) -> BlockState {
        self.state
    }

    pub fn is_fully_parceled(&self) -> bool {
        self.parceled == self.capacity
    }

    pub fn color_count(&self, physical_color: u8) -> u32 {
        self.color_counts[physical_color as usize]
    }

    /// Returns a raw pointer to the payload (post-header) of `slot`.
    pub fn payload_ptr(&self, slot: u32) -> *mut u8 {
        let offset = slot as usize * self.stride + HEADER_SIZE;
        unsafe { self.memory.as_ptr().add(offset) }
    }

    /// Returns the base address of `slot`'s full cell, header included.
    pub fn cell_base_ptr(&self, slot: u32) -> *mut u8 {
        let offset = slot as usize * self.stride;
        unsafe { self.memory.as_ptr().add(offset) }
    }

    pub fn block_base(&self) -> usize {
        self.memory.as_ptr() as usize
    }

    pub fn block_end(&self) -> usize {
        self.block_base() + self.memory.size
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Maps an address known to fall within this block's range to a slot
    /// index, or `None` if it falls in a gap (shouldn't happen for addresses
    /// that pass the page bitmap, but the classifier double-checks).
    pub fn slot_for_address(&self, addr: usize) -> Option<u32> {
        let base = self.block_base();
        if addr < base || addr >= self.block_end() {
            return None;
        }
        let rel = addr - base;
        let slot = rel / self.stride;
        if (slot as u32) < self.parceled {
            Some(slot as u32)
        } else {
            None
        }
    }

    pub fn meta(&self, slot: u32) -> &CellMeta {
        &self.meta[slot as usize]
    }

    pub fn meta_mut(&mut self, slot: u32) -> &mut CellMeta {
        &mut self.meta[slot as usize]
    }

    /// Parcels the next unparceled slot, setting its initial color and
    /// returning a reference to it. The caller (the owning `Treadmill`)
    /// splices it into the WHITE list.
    pub fn parcel_one(&mut self, id: BlockId, initial_physical_color: u8) -> Option<CellRef> {
        if self.parceled == self.capacity {
            return None;
        }
        let slot = self.parceled;
        self.parceled += 1;
        self.meta.push(CellMeta {
            color: initial_physical_color,
            ..CellMeta::EMPTY
        });
        self.color_counts[initial_physical_color as usize] += 1;
        self.state = if self.is_fully_parceled() {
            BlockState::Live
        } else {
            BlockState::Parceling
        };
        Some(CellRef { block: id, slot })
    }

    pub fn set_color(&mut self, slot: u32, physical_color: u8) {
        let old = self.meta[slot as usize].color;
        self.color_counts[old as usize] -= 1;
        self.color_counts[physical_color as usize] += 1;
        self.meta[slot as usize].color = physical_color;
    }

    pub fn mark_reclaimable_if_empty(&mut self, free_physical_color: u8) {
        if self.color_counts[free_physical_color as usize] == self.capacity {
            self.state = BlockState::Reclaimable;
        } else if self.state == BlockState::Reclaimable {
            self.state = BlockState::Live;
        }
    }

    pub fn into_memory(self) -> OsBlock {
        self.memory
    }
}
