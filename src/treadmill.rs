//! Treadmill - the four-cursor circular list at the heart of one type's heap.
//!
//! Direct translation of `original_source/tread.h`'s `tm_tread`, generalized
//! from raw `tm_node *` pointers (with two color bits stolen from `prev`) to
//! `CellRef` indices plus an explicit `color` byte in `CellMeta`. Mechanical
//! list surgery (`list_remove`/`list_insert_after`/`list_append_before`)
//! mirrors `original_source/list.h`'s `tm_list_remove`/`tm_list_insert`/
//! `tm_list_append` exactly; only the pointer representation changed.
//!
//! `flip` here performs only the mechanical half of `tm_tread_flip`: the
//! bottom/top swap and the color rotation. The original's flip also calls
//! `tm_tread_mark_roots` inline, collapsing root scanning into the flip
//! itself. This collector's phase scheduler (`phase.rs`) is incremental by
//! design (ALLOC -> UNMARK -> ROOT -> SCAN -> SWEEP), so root marking is a
//! separate ROOT-phase step driven by the scheduler, not folded into flip.

use crate::block::Block;
use crate::cell::CellRef;
use crate::color::{Color, ColorTable};

fn next(blocks: &[Block], r: CellRef) -> CellRef {
    blocks[r.block].meta(r.slot).next.expect("cell not linked")
}

fn prev(blocks: &[Block], r: CellRef) -> CellRef {
    blocks[r.block].meta(r.slot).prev.expect("cell not linked")
}

fn set_next(blocks: &mut [Block], r: CellRef, v: CellRef) {
    blocks[r.block].meta_mut(r.slot).next = Some(v);
}

fn set_prev(blocks: &mut [Block], r: CellRef, v: CellRef) {
    blocks[r.block].meta_mut(r.slot).prev = Some(v);
}

fn list_init(blocks: &mut [Block], r: CellRef) {
    set_next(blocks, r, r);
    set_prev(blocks, r, r);
}

/// Unlinks `r` from whatever circular list it is part of.
fn list_remove(blocks: &mut [Block], r: CellRef) {
    let p = prev(blocks, r);
    let n = next(blocks, r);
    set_next(blocks, p, n);
    set_prev(blocks, n, p);
}

/// Inserts `r` immediately after `anchor`.
fn list_insert_after(blocks: &mut [Block], anchor: CellRef, r: CellRef) {
    let anchor_next = next(blocks, anchor);
    set_next(blocks, r, anchor_next);
    set_prev(blocks, r, anchor);
    set_prev(blocks, anchor_next, r);
    set_next(blocks, anchor, r);
}

/// Inserts `r` immediately before `l`, i.e. at the "end" of the list headed
/// by `l` when `l` is treated as a sentinel. Mirrors `tm_list_append`.
fn list_append_before(blocks: &mut [Block], l: CellRef, r: CellRef) {
    let l_prev = prev(blocks, l);
    list_insert_after(blocks, l_prev, r);
}

const WHITE: usize = Color::White as usize;
const ECRU: usize = Color::Ecru as usize;
const GREY: usize = Color::Grey as usize;
const BLACK: usize = Color::Black as usize;
const TOTAL: usize = 4;

/// One type's treadmill: the circular list of cells plus the four cursors
/// that partition it into free/ecru/grey/black regions.
pub struct Treadmill {
    free: Option<CellRef>,
    bottom: Option<CellRef>,
    top: Option<CellRef>,
    scan: Option<CellRef>,
    /// Counts indexed by physical-independent logical color (0..3), plus a
    /// running total at index 4.
    n: [u32; 5],
    colors: ColorTable,
}

impl Default for Treadmill {
    fn default() -> Self {
        Self {
            free: None,
            bottom: None,
            top: None,
            scan: None,
            n: [0; 5],
            colors: ColorTable::new(),
        }
    }
}

impl Treadmill {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, color: Color) -> u32 {
        self.n[color.index()]
    }

    pub fn total(&self) -> u32 {
        self.n[TOTAL]
    }

    pub fn is_empty(&self) -> bool {
        self.n[TOTAL] == 0
    }

    pub(crate) fn logical_color(&self, blocks: &[Block], r: CellRef) -> Color {
        self.colors.to_logical(blocks[r.block].meta(r.slot).color)
    }

    fn set_logical_color(&mut self, blocks: &mut [Block], r: CellRef, color: Color) {
        let physical = self.colors.to_physical(color);
        blocks[r.block].set_color(r.slot, physical);
    }

    /// Links a freshly parceled cell into the list as WHITE.
    /// Grounded on `tm_tread_add_white`.
    pub fn add_white(&mut self, blocks: &mut [Block], r: CellRef) {
        if self.n[TOTAL] == 0 {
            list_init(blocks, r);
            self.free = Some(r);
            self.bottom = Some(r);
            self.top = Some(r);
            self.scan = Some(r);
        } else {
            let bottom = self.bottom.expect("non-empty treadmill has a bottom");
            list_append_before(blocks, bottom, r);
            if self.n[WHITE] == 0 {
                self.free = Some(r);
            }
        }
        self.set_logical_color(blocks, r, Color::White);
        self.n[WHITE] += 1;
        self.n[TOTAL] += 1;
    }

    /// Pulls the next cell off the free (WHITE) list and colors it BLACK.
    /// Returns `None` if no WHITE cell is available; the caller (`GcType`)
    /// is responsible for parceling more cells or flipping before retrying.
    /// Grounded on `tm_tread_allocate`, minus the inline flip/more_white
    /// calls, which the phase scheduler now drives explicitly.
    pub fn allocate(&mut self, blocks: &mut [Block]) -> Option<CellRef> {
        let n = self.free?;
        if self.n[WHITE] == 0 {
            return None;
        }

        let next_free = next(blocks, n);
        self.free = if self.n[WHITE] > 1 { Some(next_free) } else { None };

        self.set_logical_color(blocks, n, Color::Black);
        self.n[WHITE] -= 1;
        self.n[BLACK] += 1;

        Some(n)
    }

    /// True once there are neither WHITE nor GREY cells left: the signal
    /// that a flip is due. Grounded on `tm_tread_allocate`'s
    /// `if (!n[WHITE] && !n[GREY]) flip()` guard.
    pub fn needs_flip(&self) -> bool {
        self.n[WHITE] == 0 && self.n[GREY] == 0
    }

    /// Marks `r` grey if it is currently ECRU; every other color is a no-op.
    ///
    /// `original_source/tread.h`'s `tm_tread_mark` literally guards on
    /// `color(n) != ECRU`, which -- taken at face value -- would grey every
    /// non-ECRU cell including already-BLACK ones, contradicting both the
    /// surrounding comments and the tri-color invariant (marking a BLACK
    /// cell must never re-grey it outside of a write barrier). Treated as a
    /// transcription slip in the historical source; this method follows the
    /// documented invariant instead: only ECRU cells transition to GREY.
    pub fn mark(&mut self, blocks: &mut [Block], n: CellRef) {
        let color = self.logical_color(blocks, n);
        debug_assert_ne!(color, Color::White, "cannot mark a WHITE (free) cell");
        if color != Color::Ecru {
            return;
        }

        let top = self.top.expect("non-empty treadmill has a top");
        if top == n {
            self.top = Some(prev(blocks, n));
        } else {
            list_remove(blocks, n);
            list_insert_after(blocks, top, n);
        }

        self.set_logical_color(blocks, n, Color::Grey);
        if self.n[GREY] == 0 {
            self.scan = Some(n);
        }

        self.n[ECRU] -= 1;
        self.n[GREY] += 1;
    }

    /// Advances the scan cursor by one cell, moving it from GREY to BLACK.
    /// Grounded on `tm_tread_scan`. Returns `true` if a cell was advanced.
    pub fn scan_one(&mut self, blocks: &mut [Block]) -> bool {
        let (scan, top) = match (self.scan, self.top) {
            (Some(s), Some(t)) => (s, t),
            _ => return false,
        };
        if scan == top {
            return false;
        }
        self.scan = Some(prev(blocks, scan));
        self.set_logical_color(blocks, scan, Color::Black);
        self.n[GREY] -= 1;
        self.n[BLACK] += 1;
        true
    }

    /// Write-barrier re-greying: a mutated BLACK cell must be scanned again.
    /// Grounded on `tm_tread_mutation`.
    pub fn mutation(&mut self, blocks: &mut [Block], n: CellRef) {
        let color = self.logical_color(blocks, n);
        if color != Color::Black {
            return;
        }

        let top = self.top.expect("non-empty treadmill has a top");
        if top == n {
            self.top = Some(prev(blocks, n));
        } else {
            list_remove(blocks, n);
            list_insert_after(blocks, top, n);
        }

        self.set_logical_color(blocks, n, Color::Grey);
        if self.n[GREY] == 0 {
            self.scan = Some(n);
        }

        self.n[BLACK] -= 1;
        self.n[GREY] += 1;
    }

    /// Explicit free: forces `n` back to WHITE immediately, regardless of
    /// its current color, and splices it in front of the free cursor so the
    /// next `allocate` call can reuse it right away. Resolves the open
    /// question of what an explicit free does under a flip-based design
    /// (the original source has no explicit free call at all; the design
    /// notes settle on "colors the cell WHITE").
    pub fn free_now(&mut self, blocks: &mut [Block], n: CellRef) {
        let old = self.logical_color(blocks, n);
        if old == Color::White {
            return;
        }

        match old {
            Color::Ecru => self.n[ECRU] -= 1,
            Color::Grey => {
                self.n[GREY] -= 1;
                if self.scan == Some(n) {
                    self.scan = Some(prev(blocks, n));
                }
            }
            Color::Black => self.n[BLACK] -= 1,
            Color::White => unreachable!(),
        }

        if self.top == Some(n) {
            self.top = Some(prev(blocks, n));
        }

        let bottom = self.bottom.expect("non-empty treadmill has a bottom");
        if bottom != n {
            list_remove(blocks, n);
            list_append_before(blocks, bottom, n);
        }

        self.set_logical_color(blocks, n, Color::White);
        self.n[WHITE] += 1;
        if self.n[WHITE] == 1 {
            self.free = Some(n);
        }
    }

    /// Rotates the color permutation and swaps bottom/top, turning the old
    /// ECRU region free and the old BLACK region ECRU. The caller drives
    /// root re-marking as a separate phase afterward.
    /// Grounded on the mechanical half of `tm_tread_flip`.
    pub fn flip(&mut self, blocks: &mut [Block]) {
        std::mem::swap(&mut self.bottom, &mut self.top);
        self.colors.rotate();

        // n[WHITE] becomes the old n[ECRU], etc. -- same rotation as the
        // color table, applied to the counts array.
        let old = self.n;
        self.n[WHITE] = old[ECRU];
        self.n[ECRU] = old[BLACK];
        self.n[GREY] = old[WHITE];
        self.n[BLACK] = old[GREY];

        if let (Some(top), true) = (self.top, self.color_at(blocks, self.top) == Some(Color::White)) {
            self.top = Some(prev(blocks, top));
        }

        self.scan = self.top;

        if let (Some(bottom), true) = (self.bottom, self.color_at(blocks, self.bottom) == Some(Color::White)) {
            self.bottom = Some(next(blocks, bottom));
        }

        if self.n[WHITE] == 0 {
            if let Some(scan) = self.scan {
                let after_scan = next(blocks, scan);
                self.bottom = Some(after_scan);
                self.free = Some(after_scan);
            }
        }
    }

    fn color_at(&self, blocks: &[Block], r: Option<CellRef>) -> Option<Color> {
        r.map(|r| self.logical_color(blocks, r))
    }

    pub fn top(&self) -> Option<CellRef> {
        self.top
    }

    pub fn scan_cursor(&self) -> Option<CellRef> {
        self.scan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::os_alloc::OsBlock;

    fn fake_block() -> Block {
        let size = 256;
        let layout = std::alloc::Layout::from_size_align(size, 8).unwrap();
        let ptr = unsafe { std::alloc::alloc(layout) };
        Block::new(OsBlock { ptr, size }, 16)
    }

    fn parcel(blocks: &mut Vec<Block>, tread: &mut Treadmill, count: usize) -> Vec<CellRef> {
        let mut refs = Vec::new();
        for _ in 0..count {
            let r = blocks[0].parcel_one(0, 0).unwrap();
            tread.add_white(blocks, r);
            refs.push(r);
        }
        refs
    }

    #[test]
    fn allocate_drains_white_and_colors_black() {
        let mut blocks = vec![fake_block()];
        let mut tread = Treadmill::new();
        let refs = parcel(&mut blocks, &mut tread, 4);

        assert_eq!(tread.count(Color::White), 4);
        let a = tread.allocate(&mut blocks).unwrap();
        assert!(refs.contains(&a));
        assert_eq!(tread.count(Color::White), 3);
        assert_eq!(tread.count(Color::Black), 1);
    }

    #[test]
    fn mark_moves_ecru_to_grey_and_is_noop_otherwise() {
        let mut blocks = vec![fake_block()];
        let mut tread = Treadmill::new();
        let refs = parcel(&mut blocks, &mut tread, 3);
        for _ in 0..3 {
            tread.allocate(&mut blocks).unwrap();
        }
        // All BLACK. Flip to make them ECRU.
        tread.flip(&mut blocks);
        assert_eq!(tread.count(Color::Ecru), 3);

        tread.mark(&mut blocks, refs[0]);
        assert_eq!(tread.count(Color::Ecru), 2);
        assert_eq!(tread.count(Color::Grey), 1);

        // Marking an already-GREY cell is a no-op.
        tread.mark(&mut blocks, refs[0]);
        assert_eq!(tread.count(Color::Grey), 1);
    }

    #[test]
    fn scan_one_advances_grey_to_black_until_top() {
        let mut blocks = vec![fake_block()];
        let mut tread = Treadmill::new();
        let refs = parcel(&mut blocks, &mut tread, 3);
        for _ in 0..3 {
            tread.allocate(&mut blocks).unwrap();
        }
        tread.flip(&mut blocks);
        for r in &refs {
            tread.mark(&mut blocks, *r);
        }
        assert_eq!(tread.count(Color::Grey), 3);

        let mut advanced = 0;
        while tread.scan_one(&mut blocks) {
            advanced += 1;
        }
        assert_eq!(advanced, 2, "scan stops once scan cursor reaches top");
    }

    #[test]
    fn free_now_returns_a_black_cell_to_white() {
        let mut blocks = vec![fake_block()];
        let mut tread = Treadmill::new();
        parcel(&mut blocks, &mut tread, 2);
        let a = tread.allocate(&mut blocks).unwrap();
        assert_eq!(tread.count(Color::Black), 1);

        tread.free_now(&mut blocks, a);
        assert_eq!(tread.count(Color::Black), 0);
        assert_eq!(tread.count(Color::White), 2);

        let reused = tread.allocate(&mut blocks).unwrap();
        assert_eq!(reused, a);
    }

    #[test]
    fn mutation_regreys_black_cells_only() {
        let mut blocks = vec![fake_block()];
        let mut tread = Treadmill::new();
        let refs = parcel(&mut blocks, &mut tread, 2);
        let a = tread.allocate(&mut blocks).unwrap();
        assert_eq!(a, refs[0]);
        tread.mutation(&mut blocks, a);
        assert_eq!(tread.count(Color::Grey), 1);
        assert_eq!(tread.count(Color::Black), 0);

        // A WHITE cell is untouched by the write barrier.
        tread.mutation(&mut blocks, refs[1]);
        assert_eq!(tread.count(Color::White), 1);
    }
}
