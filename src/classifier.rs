//! Conservative Pointer Classifier
//!
//! Maps an arbitrary machine word to the cell it might point into, or
//! rejects it. Direct translation of `original_source/ptr.h`'s
//! `tm_ptr_to_node`: fast-reject via the page bitmap, then block lookup,
//! then intra-block arithmetic to find the owning cell, then a WHITE
//! (free-list) rejection.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::bitmap::PageBitmap;
use crate::block::BlockId;
use crate::cell::CellRef;
use crate::config::ClassifierPolicy;
use crate::gc_type::{GcType, TypeId};
use crate::globals::BLOCK_SIZE;

/// A resolved conservative reference: which type and which cell within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classified {
    pub ty: TypeId,
    pub cell: CellRef,
}

/// Everything the classifier needs to resolve an address, borrowed for the
/// duration of one call. Kept as a free function rather than a method on
/// `GlobalState` so this module has no dependency on `heap.rs`.
pub struct Classifier<'a> {
    pub bitmap: &'a PageBitmap,
    pub block_owner: &'a HashMap<usize, (TypeId, BlockId)>,
    pub types: &'a IndexMap<TypeId, GcType>,
    pub policy: ClassifierPolicy,
}

impl<'a> Classifier<'a> {
    /// Classifies `addr` as a potential pointer into the collected heap.
    /// Every rejection path mirrors a specific `tm_ptr_to_node` guard:
    /// page not in use, block untyped, past the parceled frontier, before
    /// the block's first cell, inside a cell header, or pointing at a WHITE
    /// (already-free) cell.
    pub fn classify(&self, addr: usize) -> Option<Classified> {
        if addr == 0 {
            return None;
        }

        let block_base = addr & !(BLOCK_SIZE - 1);
        if !self.bitmap.in_use(block_base) {
            return None;
        }

        let (type_id, block_id) = *self.block_owner.get(&block_base)?;
        let ty = self.types.get(&type_id)?;

        let cell = ty.classify_in_block(block_id, addr, self.policy.eoi_is_interior)?;

        if ty.is_white(cell) {
            return None;
        }

        Some(Classified { ty: type_id, cell })
    }
}
