//! Cell (node) - the smallest allocatable unit.
//!
//! The original source steals the two low bits of a `tm_node`'s intrusive
//! `prev` pointer to store the color. Rust's aliasing rules make that
//! specific trick more trouble than it is worth, so this crate follows the
//! arena+index representation the design notes call out explicitly: a
//! `Block` owns a parallel `Vec<CellMeta>`, one entry per cell slot, holding
//! the doubly-linked-list pointers (as `CellRef`s rather than raw pointers)
//! and the physical color tag. The two-word header named in the data model
//! is still real, addressed bytes at the front of every slot — scratch, not
//! a reinterpreted link — so the pointer classifier's header/payload
//! arithmetic behaves identically to the source.

use crate::block::BlockId;

/// A reference to one cell: which block it lives in, and its slot index
/// within that block's cell array. Cheap to copy, used everywhere the
/// source passes a bare `tm_node *`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRef {
    pub block: BlockId,
    pub slot: u32,
}

/// Per-cell metadata living in a block's side table.
#[derive(Debug, Clone, Copy)]
pub struct CellMeta {
    pub prev: Option<CellRef>,
    pub next: Option<CellRef>,
    /// Physical color tag, always in `0..4`; interpreted through the
    /// owning type's `ColorTable`.
    pub color: u8,
    /// Auxiliary per-cell tag word, independent of the mark color.
    /// Restored from `original_source/tm_data.c`'s `tm_data`/`tm_data_set`,
    /// which `spec.md` left out of its distillation of `alloc_desc`; this
    /// is the field `Type::describe` results and `alloc_desc` populate.
    pub user_data: usize,
}

impl CellMeta {
    pub const EMPTY: CellMeta = CellMeta {
        prev: None,
        next: None,
        color: 0,
        user_data: 0,
    };
}
