//! End-to-end retention: a cell reachable from a registered root survives
//! repeated collection cycles, while unreachable cells get recycled.

use treadgc::config::TmConfig;
use treadgc::heap::GlobalState;

#[test]
fn rooted_allocation_is_never_handed_back_to_a_new_request() {
    let mut heap = GlobalState::new(TmConfig::default()).unwrap();

    let rooted = heap.alloc(32).unwrap();

    // A stack slot holding the rooted allocation's address, registered as
    // a root range so the conservative scanner treats it as a live
    // pointer every cycle, exactly as a real mutator's stack would.
    let root_holder: usize = rooted.ptr as usize;
    let holder_addr = &root_holder as *const usize as usize;
    heap
        .add_root(holder_addr, holder_addr + std::mem::size_of::<usize>(), "stack-slot")
        .unwrap();

    let mut garbage_ptrs = std::collections::HashSet::new();
    for _ in 0..50_000 {
        let garbage = heap.alloc(32).unwrap();
        garbage_ptrs.insert(garbage.ptr as usize);
    }

    assert!(
        !garbage_ptrs.contains(&(rooted.ptr as usize)),
        "a cell reachable from a live root must never be reused for a new allocation"
    );
}

#[test]
fn unrooted_allocation_eventually_recycles() {
    let mut heap = GlobalState::new(TmConfig::default()).unwrap();

    let garbage = heap.alloc(32).unwrap();
    drop(garbage); // no root ever registered for it

    let mut reused = false;
    for _ in 0..50_000 {
        let a = heap.alloc(32).unwrap();
        if a.ptr as usize == garbage.ptr as usize {
            reused = true;
            break;
        }
    }
    assert!(reused, "an unreachable cell's memory should eventually be recycled");
}

#[test]
fn explicit_free_makes_a_cell_immediately_reusable() {
    let mut heap = GlobalState::new(TmConfig::default()).unwrap();
    let a = heap.alloc(16).unwrap();
    heap.free(a);
    let b = heap.alloc(16).unwrap();
    assert_eq!(a.ptr, b.ptr, "free()'d cell should be the very next allocation of the same size");
}
