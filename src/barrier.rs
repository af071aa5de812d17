//! Write Barrier
//!
//! Three entry points matching how a mutator can know what it just wrote
//! into: a pure cell payload pointer (cheapest, no classification needed),
//! a root location (stack/static slot, classified like any root), and the
//! general case where only a raw address is known and the classifier must
//! resolve it first. Every path bottoms out in `Treadmill::mutation`
//! (`original_source/tread.h`'s `tm_tread_mutation`), which re-greys a BLACK
//! cell so the collector does not lose track of a pointer written into
//! already-scanned memory.
//!
//! `fgc`'s barrier module implements ZGC-style colored pointers and load
//! barriers for concurrent relocation, which do not apply to a
//! single-threaded, non-moving collector; this module keeps the same
//! "three call sites" shape the design calls for but drives it through
//! explicit mutator calls rather than page-fault interception
//! (`original_source/wb.c`'s `mprotect`-based approach), since the
//! conservative classifier already gives us a cheap way to resolve a raw
//! address without trapping writes at the OS level.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::bitmap::PageBitmap;
use crate::block::BlockId;
use crate::cell::CellRef;
use crate::classifier::Classifier;
use crate::config::ClassifierPolicy;
use crate::gc_type::{GcType, TypeId};

/// The write barrier, scoped to whatever currently owns the cell being
/// mutated. Callers reach this through `GlobalState::write_barrier_*`
/// rather than constructing it directly.
pub struct WriteBarrier;

impl WriteBarrier {
    /// Pure barrier: the mutator already knows exactly which cell it wrote
    /// into (e.g. it holds a typed handle). Cheapest path, no
    /// classification required.
    pub fn pure(ty: &mut GcType, cell: CellRef) {
        ty.mutation(cell);
    }

    /// Root barrier: a write landed in a registered root range. Since roots
    /// are scanned directly for pointers, not traced through a cell, this
    /// degrades to classifying the *value written* rather than the
    /// location, via `general`.
    pub fn root(
        types: &mut IndexMap<TypeId, GcType>,
        bitmap: &PageBitmap,
        block_owner: &HashMap<usize, (TypeId, BlockId)>,
        policy: ClassifierPolicy,
        written_value: usize,
    ) {
        Self::general(types, bitmap, block_owner, policy, written_value);
    }

    /// General barrier: only a raw address is known (the value just
    /// written into some field). Classify it and, if it resolves to a live
    /// cell, re-grey it.
    ///
    /// Classification happens in its own scope so the shared borrow of
    /// `types` it needs ends before the mutable borrow used to apply the
    /// re-grey: a `Classifier` and a `&mut` of the same type table can never
    /// be alive at once.
    pub fn general(
        types: &mut IndexMap<TypeId, GcType>,
        bitmap: &PageBitmap,
        block_owner: &HashMap<usize, (TypeId, BlockId)>,
        policy: ClassifierPolicy,
        addr: usize,
    ) {
        let classified = {
            let classifier = Classifier {
                bitmap,
                block_owner,
                types: &*types,
                policy,
            };
            classifier.classify(addr)
        };

        if let Some(classified) = classified {
            if let Some(ty) = types.get_mut(&classified.ty) {
                ty.mutation(classified.cell);
            }
        }
    }
}
