//! Configuration Module - GC Tuning Parameters
//!
//! All tunables are plain numeric fields on `TmConfig`; there is no config
//! file loading (an explicit non-goal). Defaults are picked to keep a single
//! allocation call's work bounded and small, per the phase scheduler design.

use crate::error::{Result, TmError};
use crate::globals::{host_page_size, BLOCK_SIZE, DEFAULT_BLOCK_MIN_FREE, MIN_ALLOCATIONS_SINCE_SWEEP};

/// Tuning parameters for the collector.
///
/// # Examples
///
/// ```
/// use treadgc::config::TmConfig;
///
/// let config = TmConfig::default();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TmConfig {
    /// Cells parceled from a block per allocation call.
    pub node_parcel_some_size: usize,

    /// Bytes of roots scanned per allocation call.
    pub root_scan_some_size: usize,

    /// Bytes of cell interiors scanned per allocation call.
    pub node_scan_some_size: usize,

    /// Cells swept per allocation call (non-flip designs; kept for parity
    /// with the tunable table even though this crate's flip-based design
    /// folds sweeping into the flip).
    pub node_sweep_some_size: usize,

    /// Cells unmarked per allocation call (non-flip designs; see above).
    pub node_unmark_some_size: usize,

    /// Blocks probed for reclaim per allocation call.
    pub block_sweep_some_size: usize,

    /// Blocks kept on the free list before being returned to the OS.
    pub block_min_free: usize,

    /// Soft ceiling on bytes obtained from the OS.
    pub os_alloc_max: usize,

    /// If true, roots are scanned atomically at phase entry instead of
    /// incrementally across several allocation calls.
    pub root_scan_full: bool,

    /// Minimum allocations since the last sweep before the memory-pressure
    /// heuristic is allowed to advance the phase, avoiding thrashing.
    pub min_allocations_since_sweep: usize,
}

impl Default for TmConfig {
    fn default() -> Self {
        Self {
            node_parcel_some_size: 32,
            root_scan_some_size: 4096,
            node_scan_some_size: 4096,
            node_sweep_some_size: 32,
            node_unmark_some_size: 32,
            block_sweep_some_size: 4,
            block_min_free: DEFAULT_BLOCK_MIN_FREE,
            os_alloc_max: 1 << 30, // 1 GiB
            root_scan_full: true,
            min_allocations_since_sweep: MIN_ALLOCATIONS_SINCE_SWEEP,
        }
    }
}

impl TmConfig {
    /// Range-checks the configuration, following `GcConfig::validate`'s
    /// convention of catching nonsensical tunables before they reach the
    /// scheduler.
    pub fn validate(&self) -> Result<()> {
        if self.os_alloc_max < BLOCK_SIZE {
            return Err(TmError::Misuse(format!(
                "os_alloc_max ({}) is smaller than BLOCK_SIZE ({BLOCK_SIZE})",
                self.os_alloc_max
            )));
        }
        let page = host_page_size();
        if page > 0 && BLOCK_SIZE % page != 0 {
            return Err(TmError::Misuse(format!(
                "BLOCK_SIZE ({BLOCK_SIZE}) is not a multiple of the host page size ({page})"
            )));
        }
        if self.block_min_free == 0 {
            return Err(TmError::Misuse("block_min_free must be at least 1".into()));
        }
        if self.node_parcel_some_size == 0 {
            return Err(TmError::Misuse(
                "node_parcel_some_size must be at least 1".into(),
            ));
        }
        if !self.root_scan_full && self.root_scan_some_size == 0 {
            return Err(TmError::Misuse(
                "root_scan_some_size must be at least 1 when root_scan_full is false".into(),
            ));
        }
        Ok(())
    }
}

/// Toggles for the pointer classifier, kept separate from `TmConfig`
/// because they affect correctness-sensitive behavior rather than pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierPolicy {
    /// When true, a pointer exactly at a cell/block boundary is treated as
    /// interior to the *previous* cell rather than rejected. Applied
    /// uniformly at cell and block boundaries (Open Question #2).
    pub eoi_is_interior: bool,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            eoi_is_interior: false,
        }
    }
}
