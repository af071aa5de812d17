//! Statistics and the `TM_ALLOC_LOG` Allocation Trace
//!
//! Counters mirror the accounting the original source keeps directly on
//! `tm_tread.n[]`/global counters (see `original_source/stats.h`), rolled up
//! here across every type for heap-wide reporting. Ambient progress
//! messages use the `log` crate facade, matching the ecosystem-idiomatic
//! choice over `fgc::logging`'s hand-rolled `Mutex<Vec<GcEvent>>` sink,
//! since this crate has no JSON export / metrics-server surface to drive
//! (an explicit non-goal) and a plain facade is all the ambient logging
//! needs.
//!
//! `TM_ALLOC_LOG`, when set in the environment, turns on a literal
//! plain-text allocation trace independent of `log`'s level filtering: one
//! line per sampled allocation, geometrically sampled (every allocation up
//! to the 10th, then every 10th up to the 100th, then every 100th up to the
//! 1000th, then every 1000th forever), so a long-running process doesn't
//! drown its own trace in its own volume. The line format
//! (`id ptr WHITE ECRU GREY BLACK TOTAL PHASE BLOCKS FREE_BLOCKS`, with a
//! `#`-prefixed header written once) is a literal port of
//! `original_source/log.c`'s `tm_alloc_log`, which this crate's §6 carries
//! forward unchanged.

use std::fmt::Write as _;
use std::io::Write as _;

/// Running totals across the whole heap.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapStats {
    pub allocations: u64,
    pub bytes_allocated: u64,
    pub flips: u64,
    pub blocks_obtained: u64,
    pub bytes_obtained: u64,
    pub cells_swept: u64,
}

impl HeapStats {
    pub fn record_allocation(&mut self, bytes: usize) {
        self.allocations += 1;
        self.bytes_allocated += bytes as u64;
    }

    pub fn record_flip(&mut self) {
        self.flips += 1;
    }

    pub fn record_block_obtained(&mut self, bytes: usize) {
        self.blocks_obtained += 1;
        self.bytes_obtained += bytes as u64;
    }

    pub fn record_sweep(&mut self, cells: u64) {
        self.cells_swept += cells;
    }
}

/// Decides whether the Nth event (1-indexed) should be sampled, given the
/// geometric schedule described above.
pub fn is_sampled(n: u64) -> bool {
    match n {
        0 => false,
        1..=10 => true,
        11..=100 => n % 10 == 0,
        101..=1000 => n % 100 == 0,
        _ => n % 1000 == 0,
    }
}

/// One allocation's treadmill snapshot, exactly the fields
/// `original_source/log.c`'s `tm_alloc_log` prints.
#[derive(Debug, Clone, Copy)]
pub struct AllocLogSample {
    pub ptr: usize,
    pub white: u32,
    pub ecru: u32,
    pub grey: u32,
    pub black: u32,
    pub total: u32,
    pub phase: usize,
    pub blocks: usize,
    pub free_blocks: usize,
}

/// Writes one line per sampled allocation to the destination named by
/// `TM_ALLOC_LOG` (a file path), or to stderr if the variable is set but
/// empty. Disabled entirely (zero overhead beyond the counter increment) if
/// the variable is unset.
pub struct AllocLogger {
    sink: Option<std::fs::File>,
    count: u64,
}

impl AllocLogger {
    pub fn from_env() -> Self {
        match std::env::var("TM_ALLOC_LOG") {
            Ok(path) if !path.is_empty() => {
                let mut sink = std::fs::OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(&path)
                    .ok();
                if let Some(file) = sink.as_mut() {
                    let _ = writeln!(file, "#ID PTR WHITE ECRU GREY BLACK TOTAL PHASE BLOCKS FREE_BLOCKS");
                }
                Self { sink, count: 0 }
            }
            Ok(_) => Self { sink: None, count: 0 },
            Err(_) => Self { sink: None, count: 0 },
        }
    }

    pub fn enabled(&self) -> bool {
        std::env::var_os("TM_ALLOC_LOG").is_some()
    }

    /// Records one allocation event, writing a trace line if this call
    /// falls on the sampling schedule. `id` is the caller's running
    /// allocation counter (`HeapStats::allocations`), independent of this
    /// logger's own sample count.
    pub fn record(&mut self, id: u64, sample: AllocLogSample) {
        if !self.enabled() {
            return;
        }
        self.count += 1;
        if !is_sampled(self.count) {
            return;
        }

        let mut line = String::new();
        let _ = writeln!(
            line,
            "{id} {:#x} {} {} {} {} {} {} {} {}",
            sample.ptr,
            sample.white,
            sample.ecru,
            sample.grey,
            sample.black,
            sample.total,
            sample.phase,
            sample.blocks,
            sample.free_blocks,
        );

        match self.sink.as_mut() {
            Some(file) => {
                let _ = file.write_all(line.as_bytes());
            }
            None => {
                eprint!("{line}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_schedule_matches_geometric_spec() {
        assert!(is_sampled(1));
        assert!(is_sampled(10));
        assert!(!is_sampled(11));
        assert!(is_sampled(20));
        assert!(!is_sampled(150));
        assert!(is_sampled(200));
        assert!(!is_sampled(1500));
        assert!(is_sampled(2000));
        assert!(is_sampled(5000));
    }

    #[test]
    fn heap_stats_accumulate() {
        let mut stats = HeapStats::default();
        stats.record_allocation(16);
        stats.record_allocation(32);
        stats.record_flip();
        assert_eq!(stats.allocations, 2);
        assert_eq!(stats.bytes_allocated, 48);
        assert_eq!(stats.flips, 1);
    }
}
