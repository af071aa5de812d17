//! Root Set Registry
//!
//! Tracks address ranges (stack, statics, explicit registrations) to scan
//! for potential pointers, plus "anti-roots" that carve out sub-ranges that
//! must never be scanned (e.g. a nested allocator's own bookkeeping).
//! Grounded on `original_source/root.c`'s `_tm_root_add`/`tm_root_subtract`.

use crate::error::{Result, TmError};

/// One contiguous range to scan, `[low, high)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootRange {
    pub low: usize,
    pub high: usize,
}

impl RootRange {
    pub fn new(low: usize, high: usize) -> Result<Self> {
        if low >= high {
            return Err(TmError::InvalidRoot(format!(
                "root range [{low:#x}, {high:#x}) is empty or inverted"
            )));
        }
        Ok(Self { low, high })
    }

    fn len(&self) -> usize {
        self.high - self.low
    }
}

/// Result of subtracting an anti-root from a root range.
/// Mirrors `tm_root_subtract`'s five cases.
enum Subtraction {
    /// The anti-root fully covers the root: delete it.
    Deleted,
    /// No overlap: root is unchanged.
    Unchanged,
    /// The anti-root clips one end of the root.
    Clipped(RootRange),
    /// The anti-root is strictly inside the root: it splits in two.
    Split(RootRange, RootRange),
}

fn subtract(a: RootRange, b: RootRange) -> Subtraction {
    if b.low == a.low || (b.low <= a.low && a.high <= b.high) {
        return Subtraction::Deleted;
    }
    if b.high <= a.low || b.low >= a.high {
        return Subtraction::Unchanged;
    }
    if a.low < b.low && b.high < a.high {
        let left = RootRange { low: a.low, high: b.low };
        let right = RootRange { low: b.high, high: a.high };
        return Subtraction::Split(left, right);
    }
    if a.low < b.high && b.high <= a.high {
        return Subtraction::Clipped(RootRange { low: b.high, high: a.high });
    }
    if a.low < b.low && b.low <= a.high {
        return Subtraction::Clipped(RootRange { low: a.low, high: b.low });
    }
    unreachable!("root ranges {a:?} / {b:?} fell through all subtraction cases");
}

/// A named, scannable range, plus an optional callback identity recorded for
/// diagnostics (the collector itself only ever reads raw memory).
#[derive(Debug, Clone)]
pub struct Root {
    pub range: RootRange,
    pub name: &'static str,
}

/// A root whose range is recomputed on every scan rather than registered
/// once, e.g. a thread's current stack bounds. Grounded on
/// `original_source/root.c`'s callback root support alongside its static
/// `_tm_root_add`.
pub type RootCallbackFn = fn(*mut std::ffi::c_void) -> (usize, usize);

#[derive(Clone, Copy)]
pub struct RootCallback {
    pub name: &'static str,
    pub callback: RootCallbackFn,
    pub data: *mut std::ffi::c_void,
}

// SAFETY: `data` is an opaque identity handed back to `callback` on every
// scan; the collector is single-threaded (§5) and never dereferences it
// itself, so carrying it across the one mutator thread (e.g. behind the
// process-wide `GcHandle`) carries no extra hazard. Mirrors `OsBlock`'s
// rationale in `os_alloc.rs`.
unsafe impl Send for RootCallback {}
unsafe impl Sync for RootCallback {}

#[derive(Default)]
pub struct RootSet {
    roots: Vec<Root>,
    anti_roots: Vec<RootRange>,
    callbacks: Vec<RootCallback>,
}

impl RootSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn roots(&self) -> &[Root] {
        &self.roots
    }

    pub fn total_scan_bytes(&self) -> usize {
        self.roots.iter().map(|r| r.range.len()).sum()
    }

    /// Registers an anti-root. Existing roots are immediately clipped or
    /// split against it; future `add_root` calls are clipped at insertion
    /// time too.
    pub fn add_anti_root(&mut self, range: RootRange) {
        let mut kept = Vec::with_capacity(self.roots.len());
        for root in self.roots.drain(..) {
            for split in Self::split_against(root.range, range) {
                kept.push(Root { range: split, name: root.name });
            }
        }
        self.roots = kept;
        self.anti_roots.push(range);
    }

    /// Adds a root range, splitting it against every registered anti-root
    /// first. Grounded on `_tm_root_add`'s recursive anti-root scan.
    pub fn add_root(&mut self, range: RootRange, name: &'static str) {
        for r in Self::split_against_all(range, &self.anti_roots) {
            self.roots.push(Root { range: r, name });
        }
    }

    pub fn remove_root(&mut self, range: RootRange) {
        self.roots.retain(|r| r.range != range);
    }

    /// Registers a callback root: `callback(data)` is invoked fresh on every
    /// scan to produce the `[low, high)` range to walk, rather than fixing
    /// the range at registration time.
    pub fn add_callback(&mut self, name: &'static str, callback: RootCallbackFn, data: *mut std::ffi::c_void) {
        self.callbacks.push(RootCallback { name, callback, data });
    }

    pub fn remove_callback(&mut self, name: &'static str) {
        self.callbacks.retain(|c| c.name != name);
    }

    pub fn callbacks(&self) -> &[RootCallback] {
        &self.callbacks
    }

    /// Evaluates every callback root's current range, each split against
    /// registered anti-roots the same way a static root would be.
    pub fn scan_callback_ranges(&self) -> Vec<RootRange> {
        let mut out = Vec::new();
        for cb in &self.callbacks {
            let (low, high) = (cb.callback)(cb.data);
            if let Ok(range) = RootRange::new(low, high) {
                out.extend(Self::split_against_all(range, &self.anti_roots));
            }
        }
        out
    }

    fn split_against(range: RootRange, anti: RootRange) -> Vec<RootRange> {
        match subtract(range, anti) {
            Subtraction::Deleted => vec![],
            Subtraction::Unchanged => vec![range],
            Subtraction::Clipped(r) => vec![r],
            Subtraction::Split(a, b) => vec![a, b],
        }
    }

    fn split_against_all(range: RootRange, antis: &[RootRange]) -> Vec<RootRange> {
        let mut pending = vec![range];
        for anti in antis {
            let mut next = Vec::new();
            for r in pending {
                next.extend(Self::split_against(r, *anti));
            }
            pending = next;
        }
        pending
    }

    /// Scans every registered root range, calling `visit` once per
    /// pointer-aligned word. Grounded on `_tm_root_scan_all`/`_tm_range_scan`.
    ///
    /// # Safety
    /// Every byte in every registered range must currently be valid to read
    /// as a `usize`; this is the caller's (the mutator's) responsibility
    /// when registering the range.
    pub unsafe fn scan_all(&self, mut visit: impl FnMut(usize)) {
        for root in &self.roots {
            Self::scan_range(root.range, &mut visit);
        }
        for range in self.scan_callback_ranges() {
            Self::scan_range(range, &mut visit);
        }
    }

    unsafe fn scan_range(range: RootRange, visit: &mut impl FnMut(usize)) {
        let word = std::mem::size_of::<usize>();
        let mut p = range.low;
        while p + word <= range.high {
            let candidate = (p as *const usize).read_unaligned();
            visit(candidate);
            p += word;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anti_root_fully_inside_root_splits_it() {
        let mut set = RootSet::new();
        set.add_root(RootRange::new(0, 100).unwrap(), "stack");
        set.add_anti_root(RootRange::new(40, 60).unwrap());
        let ranges: Vec<_> = set.roots().iter().map(|r| r.range).collect();
        assert_eq!(ranges, vec![RootRange::new(0, 40).unwrap(), RootRange::new(60, 100).unwrap()]);
    }

    #[test]
    fn anti_root_covering_root_deletes_it() {
        let mut set = RootSet::new();
        set.add_root(RootRange::new(10, 20).unwrap(), "r");
        set.add_anti_root(RootRange::new(0, 100).unwrap());
        assert!(set.roots().is_empty());
    }

    #[test]
    fn disjoint_anti_root_leaves_root_untouched() {
        let mut set = RootSet::new();
        set.add_root(RootRange::new(10, 20).unwrap(), "r");
        set.add_anti_root(RootRange::new(100, 200).unwrap());
        assert_eq!(set.roots().len(), 1);
        assert_eq!(set.roots()[0].range, RootRange::new(10, 20).unwrap());
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(RootRange::new(10, 10).is_err());
        assert!(RootRange::new(20, 10).is_err());
    }

    #[test]
    fn callback_root_is_evaluated_fresh_on_every_scan() {
        fn current_range(data: *mut std::ffi::c_void) -> (usize, usize) {
            let base = data as usize;
            (base, base + std::mem::size_of::<usize>())
        }
        let value: usize = 0xBEEF;
        let mut set = RootSet::new();
        set.add_callback("test-callback", current_range, &value as *const usize as *mut std::ffi::c_void);
        let mut seen = Vec::new();
        unsafe {
            set.scan_all(|w| seen.push(w));
        }
        assert_eq!(seen, vec![0xBEEF]);
        set.remove_callback("test-callback");
        seen.clear();
        unsafe {
            set.scan_all(|w| seen.push(w));
        }
        assert!(seen.is_empty());
    }

    #[test]
    fn scan_all_visits_every_aligned_word() {
        let data: [usize; 4] = [1, 2, 3, 4];
        let base = data.as_ptr() as usize;
        let mut set = RootSet::new();
        set.add_root(
            RootRange::new(base, base + std::mem::size_of::<usize>() * 4).unwrap(),
            "local",
        );
        let mut seen = Vec::new();
        unsafe {
            set.scan_all(|w| seen.push(w));
        }
        assert_eq!(seen, vec![1, 2, 3, 4]);
    }
}
