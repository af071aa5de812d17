//! # treadgc - Conservative Tredmill Garbage Collection
//!
//! `treadgc` is a conservative, incremental, non-moving garbage collector
//! for Rust programs that manage their own heap allocations directly,
//! modeled on Henry Baker's treadmill algorithm: a single circular list per
//! size class, partitioned by four rotating cursors into free, ecru, grey,
//! and black regions, with a color-permutation table making a full "flip"
//! an O(1) operation.
//!
//! ## Quick Start
//!
//! ```rust
//! use treadgc::heap::GlobalState;
//! use treadgc::config::TmConfig;
//!
//! let mut heap = GlobalState::new(TmConfig::default()).unwrap();
//! let allocation = heap.alloc(64).unwrap();
//!
//! unsafe {
//!     *(allocation.ptr as *mut u64) = 0x1234;
//! }
//!
//! heap.free(allocation);
//! ```
//!
//! ## Conservative scanning
//!
//! There is no object header describing layout and no precise root map:
//! every machine word reachable from a registered root range, and every
//! word inside a marked cell, is treated as a *potential* pointer and
//! checked against the live heap by [`classifier::Classifier`]. A word that
//! happens to look like a pointer but isn't one is simply rejected; a word
//! that is a pointer is always found (no false negatives), at the cost of
//! occasionally retaining garbage that merely resembles a live address
//! (no false positives are possible, only false retentions).
//!
//! ## Incremental collection
//!
//! Collection work never stops the mutator for more than one allocation
//! call's quantum: [`phase::PhaseScheduler`] cycles every type through
//! `ALLOC -> UNMARK -> ROOT -> SCAN -> SWEEP -> ALLOC`, with each quantum's
//! size controlled by [`config::TmConfig`].
//!
//! ## Modules
//!
//! - [`heap`]: the top-level `GlobalState`/`GcHandle`, tying every other
//!   module together behind the public API.
//! - [`api`]: a `tm_alloc`/`tm_free`/`tm_root_add`-style surface over a
//!   process-wide default heap, for programs that want a single global
//!   allocator rather than an explicit `GcHandle`.
//! - [`gc_type`]: one size class's blocks and treadmill.
//! - [`treadmill`]: the four-cursor circular list and its color rotation.
//! - [`block`] / [`cell`]: the arena+index cell representation.
//! - [`os_alloc`]: OS-level block acquisition and caching.
//! - [`bitmap`]: the page-level fast-reject index.
//! - [`classifier`]: conservative pointer-to-cell resolution.
//! - [`roots`]: root/anti-root range bookkeeping.
//! - [`barrier`]: the three write-barrier entry points.
//! - [`phase`]: the incremental collection state machine.
//! - [`stats`]: heap-wide counters and the `TM_ALLOC_LOG` trace.
//! - [`config`]: tunables and the classifier's EOI policy.
//! - [`error`]: the collector's error taxonomy.
//! - [`color`]: the logical/physical color permutation.

pub mod api;
pub mod barrier;
pub mod bitmap;
pub mod block;
pub mod cell;
pub mod classifier;
pub mod color;
pub mod config;
pub mod error;
pub mod gc_type;
pub mod globals;
pub mod heap;
pub mod os_alloc;
pub mod phase;
pub mod roots;
pub mod stats;
pub mod treadmill;

pub use config::TmConfig;
pub use error::{Result, TmError};
pub use heap::{Allocation, GcHandle, GlobalState};
