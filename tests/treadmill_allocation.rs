//! End-to-end allocation behavior: growth across blocks, size classing,
//! and the soft OS ceiling.

use treadgc::config::TmConfig;
use treadgc::heap::GlobalState;

#[test]
fn allocations_of_the_same_size_share_a_type() {
    let mut heap = GlobalState::new(TmConfig::default()).unwrap();
    let a = heap.alloc(16).unwrap();
    let b = heap.alloc(16).unwrap();
    assert_eq!(a.ty, b.ty);
}

#[test]
fn allocations_of_different_sizes_use_different_types() {
    let mut heap = GlobalState::new(TmConfig::default()).unwrap();
    let small = heap.alloc(8).unwrap();
    let large = heap.alloc(4096).unwrap();
    assert_ne!(small.ty, large.ty);
}

#[test]
fn allocation_grows_across_many_blocks() {
    let mut heap = GlobalState::new(TmConfig::default()).unwrap();
    let mut seen = std::collections::HashSet::new();
    for _ in 0..20_000 {
        let a = heap.alloc(16).unwrap();
        seen.insert(a.ptr as usize);
    }
    // Every allocation returned a distinct address; the collector had to
    // keep growing (or recycling freed cells) rather than handing back the
    // same memory twice while cells were still logically in use.
    assert!(seen.len() > 1);
}

#[test]
fn soft_os_ceiling_eventually_rejects_allocation() {
    let mut config = TmConfig::default();
    config.os_alloc_max = treadgc::globals::BLOCK_SIZE;
    let mut heap = GlobalState::new(config).unwrap();

    let mut failed = false;
    for _ in 0..100_000 {
        if heap.alloc(64).is_err() {
            failed = true;
            break;
        }
    }
    assert!(failed, "ceiling of one block must eventually reject an allocation");
}

#[test]
fn zero_sized_request_still_rounds_up_to_minimum_allocation() {
    let mut heap = GlobalState::new(TmConfig::default()).unwrap();
    let a = heap.alloc(0).unwrap();
    assert!(!a.ptr.is_null());
}
