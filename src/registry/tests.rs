//! Registry tests - bookkeeping and collection sweep validation
//!
//! Runs against independent `Registry` instances, so no test touches the
//! process-wide registry.

use super::*;
use std::cell::Cell;

thread_local! {
    static FREED: Cell<usize> = const { Cell::new(0) };
}

fn freed_count() -> usize {
    FREED.with(|c| c.get())
}

fn leak_u32(v: u32) -> *mut u8 {
    Box::into_raw(Box::new(v)).cast()
}

unsafe fn counting_free(addr: *mut u8, _len: usize) {
    drop(Box::from_raw(addr as *mut u32));
    FREED.with(|c| c.set(c.get() + 1));
}

fn register_object(registry: &mut Registry, addr: *mut u8) {
    registry.register_or_increment(addr, Shape::object(), "u32", counting_free);
}

#[test]
fn fresh_registry_is_empty() {
    let registry = Registry::new();
    assert!(registry.is_empty());
    assert_eq!(registry.len(), 0);
    assert!(registry.dump().is_empty());
}

#[test]
fn register_creates_entry_with_count_one() {
    let mut registry = Registry::new();
    let addr = leak_u32(7);

    register_object(&mut registry, addr);
    assert_eq!(registry.len(), 1);

    let entry = registry.find(addr).expect("entry present");
    assert_eq!(entry.ref_count(), 1);
    assert_eq!(entry.address(), addr);
    assert!(!entry.shape().is_array);

    registry.shutdown();
}

#[test]
fn register_same_address_twice_shares_one_entry() {
    let mut registry = Registry::new();
    let addr = leak_u32(7);

    register_object(&mut registry, addr);
    register_object(&mut registry, addr);

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.find(addr).unwrap().ref_count(), 2);

    registry.shutdown();
}

#[test]
fn find_absent_address_returns_none() {
    let mut registry = Registry::new();
    let addr = leak_u32(1);
    register_object(&mut registry, addr);

    let other = addr.wrapping_add(1024);
    assert!(registry.find(other).is_none());

    registry.shutdown();
}

#[test]
fn decrement_lowers_count() {
    let mut registry = Registry::new();
    let addr = leak_u32(3);
    register_object(&mut registry, addr);
    register_object(&mut registry, addr);

    registry.decrement(addr);
    assert_eq!(registry.find(addr).unwrap().ref_count(), 1);
    registry.decrement(addr);
    assert_eq!(registry.find(addr).unwrap().ref_count(), 0);

    // Zero is the floor; a further decrement does not underflow.
    registry.decrement(addr);
    assert_eq!(registry.find(addr).unwrap().ref_count(), 0);

    registry.collect();
}

#[test]
#[should_panic(expected = "no registry entry")]
fn decrement_unknown_address_is_fatal() {
    let mut registry = Registry::new();
    let mut on_stack = 5u32;
    let addr = (&mut on_stack as *mut u32).cast::<u8>();
    registry.decrement(addr);
}

#[test]
#[should_panic(expected = "never registered")]
fn increment_existing_unknown_address_is_fatal() {
    let mut registry = Registry::new();
    let mut on_stack = 5u32;
    let addr = (&mut on_stack as *mut u32).cast::<u8>();
    registry.increment_existing(addr);
}

#[test]
#[should_panic(expected = "shape mismatch")]
fn shape_disagreement_is_fatal() {
    let mut registry = Registry::new();
    let addr = leak_u32(9);
    registry.register_or_increment(addr, Shape::object(), "u32", counting_free);
    registry.register_or_increment(addr, Shape::array(4), "u32", counting_free);
}

#[test]
fn collect_on_empty_registry_frees_nothing() {
    let mut registry = Registry::new();
    assert!(!registry.collect());
}

#[test]
fn collect_on_fully_referenced_registry_frees_nothing() {
    let mut registry = Registry::new();
    let a = leak_u32(1);
    let b = leak_u32(2);
    register_object(&mut registry, a);
    register_object(&mut registry, b);

    assert!(!registry.collect());
    assert_eq!(registry.len(), 2);

    registry.shutdown();
}

#[test]
fn collect_frees_exactly_the_unreferenced_entries() {
    let mut registry = Registry::new();
    let before = freed_count();

    // Interleave dead and live entries so removal shifts survivors.
    let addrs: Vec<*mut u8> = (0u32..6).map(leak_u32).collect();
    for &addr in &addrs {
        register_object(&mut registry, addr);
    }
    for &addr in &[addrs[0], addrs[2], addrs[4]] {
        registry.decrement(addr);
    }

    assert!(registry.collect());
    assert_eq!(freed_count() - before, 3);
    assert_eq!(registry.len(), 3);
    for &addr in &[addrs[1], addrs[3], addrs[5]] {
        assert_eq!(registry.find(addr).unwrap().ref_count(), 1);
    }
    for &addr in &[addrs[0], addrs[2], addrs[4]] {
        assert!(registry.find(addr).is_none());
    }

    registry.shutdown();
}

#[test]
fn collect_returns_true_then_false() {
    let mut registry = Registry::new();
    let addr = leak_u32(11);
    register_object(&mut registry, addr);
    registry.decrement(addr);

    assert!(registry.collect());
    assert!(!registry.collect());
    assert!(registry.is_empty());
}

#[test]
fn shutdown_reclaims_everything_regardless_of_counts() {
    let mut registry = Registry::new();
    let before = freed_count();

    for i in 0u32..4 {
        let addr = leak_u32(i);
        register_object(&mut registry, addr);
        register_object(&mut registry, addr); // count 2, still referenced
    }
    assert_eq!(registry.len(), 4);

    registry.shutdown();
    assert!(registry.is_empty());
    assert_eq!(freed_count() - before, 4);
}

#[test]
fn shutdown_on_empty_registry_is_noop() {
    let mut registry = Registry::new();
    registry.shutdown();
    assert!(registry.is_empty());
}

#[test]
fn entries_compare_by_address_only() {
    let a = leak_u32(1);
    let e1 = Entry::new(a, Shape::object(), "u32", counting_free);
    let e2 = Entry::new(a, Shape::array(8), "u32", counting_free);
    let b = leak_u32(2);
    let e3 = Entry::new(b, Shape::object(), "u32", counting_free);

    assert_eq!(e1, e2);
    assert_ne!(e1, e3);

    unsafe {
        e1.release();
        e3.release();
    }
    // e2 aliases e1's address; entries only free through release(), so
    // dropping it is harmless.
    drop(e2);
}

#[test]
fn dump_snapshots_reflect_entries() {
    let mut registry = Registry::new();
    let addr = leak_u32(42);
    registry.register_or_increment(addr, Shape::array(3), "u32", counting_free);
    registry.register_or_increment(addr, Shape::array(3), "u32", counting_free);

    let snaps = registry.dump();
    assert_eq!(snaps.len(), 1);
    assert_eq!(snaps[0].address, addr as usize);
    assert_eq!(snaps[0].ref_count, 2);
    assert!(snaps[0].is_array);
    assert_eq!(snaps[0].array_len, 3);
    assert_eq!(snaps[0].type_name, "u32");

    let text = snaps[0].to_string();
    assert!(text.contains("count=2"));
    assert!(text.contains("array[3]"));

    registry.shutdown();
}

#[test]
fn snapshots_serialize_to_json() {
    let mut registry = Registry::new();
    let addr = leak_u32(1);
    register_object(&mut registry, addr);

    let json = serde_json::to_string(&registry.dump()).expect("serializable");
    assert!(json.contains("\"ref_count\":1"));
    assert!(json.contains("\"is_array\":false"));

    registry.shutdown();
}

#[test]
fn shape_elements() {
    assert_eq!(Shape::object().elements(), 1);
    assert_eq!(Shape::array(5).elements(), 5);
    assert_eq!(Shape::array(0).elements(), 0);
}
