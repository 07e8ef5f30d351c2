//! Split integration tests: distribution, lifetime and allocator accounting.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::thread;

use couplist::{Bounded, List, ListError};

#[test]
fn split_preserves_order_within_each_part() {
    common::init_tracing();

    let list: List<i32> = List::new();
    // Inserted out of order; positions follow key order.
    for k in [9, 1, 7, 3, 5, 2, 8, 4, 6] {
        list.insert(k, k).unwrap();
    }

    let parts = list.split(2).unwrap();

    for k in [1, 3, 5, 7, 9] {
        assert_eq!(parts[0].find(k), Ok(true));
        assert_eq!(parts[1].find(k), Ok(false));
    }
    for k in [2, 4, 6, 8] {
        assert_eq!(parts[1].find(k), Ok(true));
    }
    assert_eq!(parts[0].check_invariants(), Ok(5));
    assert_eq!(parts[1].check_invariants(), Ok(4));
}

#[test]
fn split_empty_list_gives_empty_parts() {
    let list: List<u8> = List::new();
    let parts = list.split(3).unwrap();

    assert_eq!(parts.len(), 3);
    for part in &parts {
        assert_eq!(part.is_empty(), Ok(true));
        assert!(part.is_alive());
    }
}

#[test]
fn split_parts_work_independently_across_threads() {
    common::init_tracing();

    let list: List<u64> = List::new();
    for k in 0..1_000 {
        list.insert(k, 0).unwrap();
    }
    let parts: Vec<Arc<List<u64>>> = list.split(4).unwrap().into_iter().map(Arc::new).collect();

    let handles: Vec<_> = parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            let part = Arc::clone(part);
            thread::spawn(move || {
                // Each part holds keys congruent to i mod 4; fill in the rest.
                for k in 0..1_000 {
                    if k % 4 != i as i32 {
                        part.insert(k, 1).unwrap();
                    }
                }
                part.check_invariants().unwrap()
            })
        })
        .collect();

    for h in handles {
        assert_eq!(h.join().unwrap(), 1_000);
    }
}

#[test]
fn split_shares_allocator_with_source() {
    let alloc = Arc::new(Bounded::new(20));
    let list: List<u8, Bounded> = List::try_new_in(Arc::clone(&alloc)).unwrap();
    for k in 0..6 {
        list.insert(k, 0).unwrap();
    }

    let parts = list.split(3).unwrap();
    assert!(parts.iter().all(|p| Arc::ptr_eq(p.allocator(), &alloc)));
    assert_eq!(alloc.live(), 6 + 3 * 2);

    // Budget is shared: parts compete for the remaining 8 nodes.
    for k in 10..18 {
        parts[(k % 3) as usize].insert(k, 0).unwrap();
    }
    assert_eq!(parts[0].insert(100, 0), Err(ListError::Alloc));

    drop(parts);
    assert_eq!(alloc.live(), 0);
}

#[test]
fn split_after_teardown_is_list_freed() {
    let list: List<u8> = List::new();
    list.teardown().unwrap();
    assert_eq!(list.split(2).err(), Some(ListError::ListFreed));
}
