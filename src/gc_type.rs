//! Type - all cells of one size class, backed by one or more blocks.
//!
//! Corresponds to `tm_type` in the original source: a type owns its blocks
//! and the single treadmill threading every cell across them.

use crate::block::{Block, BlockId};
use crate::cell::CellRef;
use crate::color::Color;
use crate::error::Result;
use crate::globals::HEADER_SIZE;
use crate::os_alloc::BlockAllocator;
use crate::treadmill::Treadmill;

/// Identifies a `Type` within `GlobalState::types`.
pub type TypeId = usize;

pub struct GcType {
    id: TypeId,
    /// Payload size in bytes for every cell of this type (rounded up to
    /// `MIN_ALLOCATION`).
    cell_size: usize,
    /// `cell_size + HEADER_SIZE`: the full on-disk stride of one cell.
    stride: usize,
    blocks: Vec<Block>,
    treadmill: Treadmill,
    cells_since_sweep: usize,
}

impl GcType {
    pub fn new(id: TypeId, cell_size: usize) -> Self {
        Self {
            id,
            cell_size,
            stride: cell_size + HEADER_SIZE,
            blocks: Vec::new(),
            treadmill: Treadmill::new(),
            cells_since_sweep: 0,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn cell_size(&self) -> usize {
        self.cell_size
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn treadmill(&self) -> &Treadmill {
        &self.treadmill
    }

    /// Obtains a new block from the allocator and registers it, returning
    /// its `BlockId` and base address so the caller can index the page
    /// bitmap and block-ownership table.
    pub fn grow(&mut self, os: &mut BlockAllocator, block_bytes: usize) -> Result<(BlockId, usize)> {
        let memory = os.alloc_aligned(block_bytes)?;
        let base = memory.as_ptr() as usize;
        let block = Block::new(memory, self.stride);
        let id = self.blocks.len();
        self.blocks.push(block);
        Ok((id, base))
    }

    /// Parcels `count` fresh WHITE cells from `block_id`, returning how many
    /// were actually parceled (less than `count` if the block ran out).
    pub fn parcel_some(&mut self, block_id: BlockId, count: usize) -> usize {
        let mut done = 0;
        while done < count {
            match self.blocks[block_id].parcel_one(block_id, 0) {
                Some(r) => {
                    self.treadmill.add_white(&mut self.blocks, r);
                    done += 1;
                }
                None => break,
            }
        }
        done
    }

    pub fn has_unparceled_capacity(&self, block_id: BlockId) -> bool {
        !self.blocks[block_id].is_fully_parceled()
    }

    pub fn needs_flip(&self) -> bool {
        self.treadmill.needs_flip()
    }

    pub fn flip(&mut self) {
        self.treadmill.flip(&mut self.blocks);
    }

    /// Pulls one WHITE cell off the treadmill, if any. Returns `None` when
    /// this type currently has no free capacity anywhere.
    pub fn allocate_cell(&mut self) -> Option<CellRef> {
        let r = self.treadmill.allocate(&mut self.blocks);
        if r.is_some() {
            self.cells_since_sweep += 1;
        }
        r
    }

    pub fn mark(&mut self, r: CellRef) {
        self.treadmill.mark(&mut self.blocks, r);
    }

    pub fn scan_some(&mut self, amount: usize) -> usize {
        let mut scanned = 0;
        while scanned < amount && self.treadmill.scan_one(&mut self.blocks) {
            scanned += 1;
        }
        scanned
    }

    pub fn mutation(&mut self, r: CellRef) {
        self.treadmill.mutation(&mut self.blocks, r);
    }

    pub fn free_now(&mut self, r: CellRef) {
        self.treadmill.free_now(&mut self.blocks, r);
    }

    pub fn payload_ptr(&self, r: CellRef) -> *mut u8 {
        self.blocks[r.block].payload_ptr(r.slot)
    }

    pub fn logical_color(&self, r: CellRef) -> Color {
        self.treadmill.logical_color(&self.blocks, r)
    }

    pub fn is_white(&self, r: CellRef) -> bool {
        self.logical_color(r) == Color::White
    }

    pub fn user_data(&self, r: CellRef) -> usize {
        self.blocks[r.block].meta(r.slot).user_data
    }

    pub fn set_user_data(&mut self, r: CellRef, value: usize) {
        self.blocks[r.block].meta_mut(r.slot).user_data = value;
    }

    /// Classifies a raw address already known to fall within `block_id`'s
    /// range into a cell reference, honoring the EOI (end-of-interior)
    /// policy at the cell boundary. Returns `None` for header bytes, WHITE
    /// (free) cells, or addresses past the parceled frontier.
    pub fn classify_in_block(
        &self,
        block_id: BlockId,
        addr: usize,
        eoi_is_interior: bool,
    ) -> Option<CellRef> {
        let block = &self.blocks[block_id];
        let base = block.block_base();
        let rel = addr.checked_sub(base)?;
        let stride = block.stride();
        let mut slot = rel / stride;
        let intra = rel % stride;

        if intra == 0 && rel != 0 && eoi_is_interior {
            slot -= 1;
        } else if intra < HEADER_SIZE {
            // Pointer lands in the cell's header, never in live payload.
            return None;
        }

        if (slot as u32) >= block.parceled() {
            return None;
        }

        Some(CellRef {
            block: block_id,
            slot: slot as u32,
        })
    }
}
