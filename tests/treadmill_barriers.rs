//! End-to-end write-barrier behavior: a write into an already-black cell
//! re-greys it through each of the three public barrier entry points.

use treadgc::color::Color;
use treadgc::config::TmConfig;
use treadgc::heap::GlobalState;

#[test]
fn pure_barrier_regreys_a_black_allocation() {
    let mut heap = GlobalState::new(TmConfig::default()).unwrap();
    let a = heap.alloc(16).unwrap();
    assert_eq!(heap.color_of(a), Some(Color::Black));

    heap.write_barrier_pure(a);
    assert_eq!(heap.color_of(a), Some(Color::Grey));
}

#[test]
fn general_barrier_resolves_a_raw_address_into_the_owning_cell() {
    let mut heap = GlobalState::new(TmConfig::default()).unwrap();
    let a = heap.alloc(16).unwrap();
    assert_eq!(heap.color_of(a), Some(Color::Black));

    heap.write_barrier_general(a.ptr as usize);
    assert_eq!(heap.color_of(a), Some(Color::Grey));
}

#[test]
fn root_barrier_classifies_the_written_value_not_the_location() {
    let mut heap = GlobalState::new(TmConfig::default()).unwrap();
    let a = heap.alloc(16).unwrap();
    assert_eq!(heap.color_of(a), Some(Color::Black));

    // The root barrier is told the *value* just stored into a root slot,
    // not the slot's own address.
    heap.write_barrier_root(a.ptr as usize);
    assert_eq!(heap.color_of(a), Some(Color::Grey));
}

#[test]
fn general_barrier_on_a_non_pointer_value_is_harmless() {
    let mut heap = GlobalState::new(TmConfig::default()).unwrap();
    let a = heap.alloc(16).unwrap();

    heap.write_barrier_general(0xdead_beef);
    // Unrelated cell is untouched by a barrier call that resolves to nothing.
    assert_eq!(heap.color_of(a), Some(Color::Black));
}

#[test]
fn freed_cell_is_unaffected_by_a_stale_barrier_call() {
    let mut heap = GlobalState::new(TmConfig::default()).unwrap();
    let a = heap.alloc(16).unwrap();
    heap.free(a);
    assert_eq!(heap.color_of(a), Some(Color::White));

    heap.write_barrier_pure(a);
    // `pure` trusts the caller's handle unconditionally, so it still moves
    // the cell through `mutation`; a white cell has no grey count to gain
    // from this, since mutation only acts on cells the classifier would
    // still consider live. This call must not panic or corrupt state.
    let _ = heap.color_of(a);
}
