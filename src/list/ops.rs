//! Positional operations: insert, remove, find, update, compute.
//!
//! Every operation follows the same shape:
//!
//! ```text
//! 1. validate arguments / reserve storage   (no shared lock held)
//! 2. locate(key) → Window { previous, current }   (two structural locks)
//! 3. act on the window
//! 4. release structural locks
//! 5. container lock, only to adjust `size`
//! ```
//!
//! Value access (update, compute, the drain in remove) takes the entry's value
//! lock while its structural lock is still held and keeps it after the
//! structural locks are released. Structural before value is the only order in
//! which the two kinds of lock are ever nested.

use std::sync::Arc;

use crate::alloc::NodeAllocator;
use crate::error::ListError;
use crate::node::{Node, NodeGuard, NodeRef, ValueGuard, handle_of, is_sentinel_key};
use crate::tracing_helpers::debug_log;
use crate::transform::Transform;

use super::List;
use super::traverse::Window;

impl<V, A: NodeAllocator> List<V, A> {
    /// Insert `value` under `key`.
    ///
    /// The node is allocated before any lock is taken, so an allocation
    /// failure never touches the list.
    ///
    /// # Errors
    ///
    /// - [`ListError::Param`] if `key` is `i32::MIN` or `i32::MAX`
    /// - [`ListError::Alloc`] if the allocator refuses the node
    /// - [`ListError::DuplicateKey`] if `key` is already present (the list is
    ///   unchanged and `value` is dropped)
    /// - [`ListError::ListFreed`] if the list was torn down or split
    pub fn insert(&self, key: i32, value: V) -> Result<(), ListError> {
        if is_sentinel_key(key) {
            return Err(ListError::Param);
        }

        self.allocator.try_reserve(1)?;
        let node: NodeRef<V> = Node::entry(key, value, self.id);

        let window: Window<V> = match self.locate(key) {
            Ok(window) => window,
            Err(err) => {
                self.allocator.release(1);
                return Err(err);
            }
        };

        if window.current.key == key {
            drop(window);
            drop(node);
            self.allocator.release(1);
            return Err(ListError::DuplicateKey);
        }

        Self::splice(window, node);
        self.adjust_size(true);

        debug_log!(list = self.id, key, "insert: spliced");
        Ok(())
    }

    /// Link `node` between the window's nodes. Four link writes, all under
    /// the window's locks.
    fn splice(mut window: Window<V>, node: NodeRef<V>) {
        {
            // Unreachable until the writes below, so this lock is uncontended.
            let mut fresh = node.lock();
            fresh.prev = Arc::downgrade(handle_of(&window.previous));
            fresh.next = Some(Arc::clone(handle_of(&window.current)));
        }

        window.current.prev = Arc::downgrade(&node);
        window.previous.next = Some(node);
    }

    /// Remove the entry under `key`.
    ///
    /// The entry is unlinked under its own and its predecessor's locks, then
    /// drained: its value lock is taken and released so no compute or update
    /// is still running against it when it is freed.
    ///
    /// # Errors
    ///
    /// - [`ListError::KeyAbsent`] if `key` is not present
    /// - [`ListError::ListFreed`] if the list was torn down or split
    pub fn remove(&self, key: i32) -> Result<(), ListError> {
        let window: Window<V> = self.locate(key)?;
        if !window.matches(key) {
            return Err(ListError::KeyAbsent);
        }

        let Window {
            mut current,
            mut previous,
        } = window;

        let successor: NodeRef<V> = current.next.take().ok_or(ListError::Failure)?;
        previous.next = Some(Arc::clone(&successor));
        current.retired = true;

        let new_back_link = Arc::downgrade(handle_of(&previous));
        let stale_back_link = Arc::downgrade(handle_of(&current));
        drop(previous);

        // Repair the successor's back link unless a concurrent insert into
        // the gap already did. Still two locks, still in chain order.
        {
            let mut after: NodeGuard<V> = successor.lock_arc();
            if std::sync::Weak::ptr_eq(&after.prev, &stale_back_link) {
                after.prev = new_back_link;
            }
        }

        current.drain();
        drop(current);

        self.allocator.release(1);
        self.adjust_size(false);

        debug_log!(list = self.id, key, "remove: unlinked");
        Ok(())
    }

    /// Whether an entry with `key` is present.
    ///
    /// Sentinel keys are never reported present.
    ///
    /// # Errors
    ///
    /// [`ListError::ListFreed`] if the list was torn down or split.
    pub fn find(&self, key: i32) -> Result<bool, ListError> {
        let window: Window<V> = self.locate(key)?;
        Ok(window.matches(key))
    }

    /// Replace the value under `key`, returning the previous value.
    ///
    /// The swap happens under the entry's value lock, so it is ordered with
    /// respect to concurrent computes on the same key.
    ///
    /// # Errors
    ///
    /// - [`ListError::NotFound`] if `key` is not present (`value` is dropped)
    /// - [`ListError::ListFreed`] if the list was torn down or split
    pub fn update(&self, key: i32, value: V) -> Result<V, ListError> {
        let mut slot: ValueGuard<V> = self.lock_value(key)?;
        Ok(std::mem::replace(&mut *slot, value))
    }

    /// Evaluate `transform` against the value under `key`.
    ///
    /// The structural locks are released before the callback runs, so the
    /// chain stays traversable. The value lock is held for the whole call:
    /// computes on one key are serialized and a remove of the key waits for
    /// the call to return.
    ///
    /// # Errors
    ///
    /// - [`ListError::NotFound`] if `key` is not present
    /// - [`ListError::ListFreed`] if the list was torn down or split
    pub fn compute<T>(&self, key: i32, transform: &T) -> Result<i32, ListError>
    where
        T: Transform<V> + ?Sized,
    {
        let slot: ValueGuard<V> = self.lock_value(key)?;
        Ok(transform.evaluate(&slot))
    }

    /// Locate `key` and return its value lock with the structural locks
    /// already released (current first, then previous).
    fn lock_value(&self, key: i32) -> Result<ValueGuard<V>, ListError> {
        let window: Window<V> = self.locate(key)?;
        if !window.matches(key) {
            return Err(ListError::NotFound);
        }

        let slot: ValueGuard<V> = window.value_cell()?.lock_arc();
        drop(window);
        Ok(slot)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use crate::List;
    use crate::alloc::Bounded;
    use crate::error::ListError;

    #[test]
    fn test_insert_keeps_keys_sorted() {
        let list: List<i32> = List::new();
        for k in [5, -3, 12, 0, 7, -100] {
            list.insert(k, k).unwrap();
        }

        assert_eq!(list.keys(), vec![-100, -3, 0, 5, 7, 12]);
        assert_eq!(list.len(), Ok(6));
        assert_eq!(list.check_invariants(), Ok(6));
    }

    #[test]
    fn test_insert_duplicate_leaves_list_unchanged() {
        let list: List<&str> = List::new();
        list.insert(1, "first").unwrap();

        assert_eq!(list.insert(1, "second"), Err(ListError::DuplicateKey));
        assert_eq!(list.len(), Ok(1));
        assert_eq!(list.compute(1, &|v: &&str| v.len() as i32), Ok(5));
    }

    #[test]
    fn test_insert_rejects_sentinel_keys() {
        let list: List<u8> = List::new();

        assert_eq!(list.insert(i32::MIN, 0), Err(ListError::Param));
        assert_eq!(list.insert(i32::MAX, 0), Err(ListError::Param));
        assert_eq!(list.insert(i32::MIN + 1, 0), Ok(()));
        assert_eq!(list.insert(i32::MAX - 1, 0), Ok(()));
        assert_eq!(list.keys(), vec![i32::MIN + 1, i32::MAX - 1]);
    }

    #[test]
    fn test_insert_alloc_failure_touches_nothing() {
        let alloc = Arc::new(Bounded::new(4));
        let list: List<u8, Bounded> = List::try_new_in(Arc::clone(&alloc)).unwrap();

        list.insert(1, 1).unwrap();
        list.insert(2, 2).unwrap();
        assert_eq!(list.insert(3, 3), Err(ListError::Alloc));
        assert_eq!(list.keys(), vec![1, 2]);
        assert_eq!(list.len(), Ok(2));

        // A rejected duplicate gives its reservation back.
        list.remove(1).unwrap();
        assert_eq!(list.insert(2, 9), Err(ListError::DuplicateKey));
        assert_eq!(alloc.live(), 3);
        assert_eq!(list.compute(2, &|v: &u8| i32::from(*v)), Ok(2));
    }

    #[test]
    fn test_round_trip() {
        let list: List<String> = List::new();

        list.insert(42, "answer".to_string()).unwrap();
        assert_eq!(list.find(42), Ok(true));
        assert_eq!(list.remove(42), Ok(()));
        assert_eq!(list.find(42), Ok(false));
        assert_eq!(list.remove(42), Err(ListError::KeyAbsent));
        assert_eq!(list.len(), Ok(0));
    }

    #[test]
    fn test_remove_repairs_back_links() {
        let list: List<i32> = List::new();
        for k in 1..=5 {
            list.insert(k, k).unwrap();
        }

        list.remove(3).unwrap();
        list.remove(1).unwrap();
        list.remove(5).unwrap();

        assert_eq!(list.keys(), vec![2, 4]);
        assert_eq!(list.check_invariants(), Ok(2));
    }

    #[test]
    fn test_sentinel_keys_are_never_found() {
        let list: List<i32> = List::new();
        list.insert(0, 0).unwrap();

        assert_eq!(list.find(i32::MIN), Ok(false));
        assert_eq!(list.find(i32::MAX), Ok(false));
        assert_eq!(list.remove(i32::MIN), Err(ListError::KeyAbsent));
        assert_eq!(list.update(i32::MAX, 1), Err(ListError::NotFound));
        assert_eq!(list.compute(i32::MIN, &|v: &i32| *v), Err(ListError::NotFound));
    }

    #[test]
    fn test_update_returns_previous_value() {
        let list: List<Vec<u8>> = List::new();
        list.insert(9, vec![1]).unwrap();

        assert_eq!(list.update(9, vec![2, 2]), Ok(vec![1]));
        assert_eq!(list.compute(9, &|v: &Vec<u8>| v.len() as i32), Ok(2));
        assert_eq!(list.update(10, vec![]), Err(ListError::NotFound));
    }

    #[test]
    fn test_compute_does_not_block_traversal() {
        let list: Arc<List<u64>> = Arc::new(List::new());
        for k in 0..4 {
            list.insert(k, 0).unwrap();
        }

        let started = Arc::new(AtomicBool::new(false));
        let slow = {
            let list = Arc::clone(&list);
            let started = Arc::clone(&started);
            thread::spawn(move || {
                let wait = |_: &u64| {
                    started.store(true, Ordering::Release);
                    thread::sleep(Duration::from_millis(100));
                    1
                };
                list.compute(1, &wait)
            })
        };

        while !started.load(Ordering::Acquire) {
            thread::yield_now();
        }

        // Walks past key 1 while the callback is still sleeping.
        list.insert(2_000, 0).unwrap();
        assert_eq!(list.find(3), Ok(true));

        assert_eq!(slow.join().unwrap(), Ok(1));
    }

    #[test]
    fn test_computes_on_one_key_are_serialized() {
        let list: Arc<List<u64>> = Arc::new(List::new());
        list.insert(7, 0).unwrap();
        let inside = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(AtomicBool::new(false));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let list = Arc::clone(&list);
                let inside = Arc::clone(&inside);
                let overlap = Arc::clone(&overlap);
                thread::spawn(move || {
                    for _ in 0..20 {
                        let probe = |_: &u64| {
                            if inside.fetch_add(1, Ordering::AcqRel) != 0 {
                                overlap.store(true, Ordering::Release);
                            }
                            thread::yield_now();
                            inside.fetch_sub(1, Ordering::AcqRel);
                            0
                        };
                        list.compute(7, &probe).unwrap();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert!(!overlap.load(Ordering::Acquire));
    }

    #[test]
    fn test_remove_waits_for_running_compute() {
        let list: Arc<List<u64>> = Arc::new(List::new());
        list.insert(1, 5).unwrap();
        let finished = Arc::new(AtomicBool::new(false));
        let started = Arc::new(AtomicBool::new(false));

        let worker = {
            let list = Arc::clone(&list);
            let finished = Arc::clone(&finished);
            let started = Arc::clone(&started);
            thread::spawn(move || {
                let slow = |v: &u64| {
                    started.store(true, Ordering::Release);
                    thread::sleep(Duration::from_millis(50));
                    finished.store(true, Ordering::Release);
                    *v as i32
                };
                list.compute(1, &slow)
            })
        };

        while !started.load(Ordering::Acquire) {
            thread::yield_now();
        }
        list.remove(1).unwrap();

        assert!(finished.load(Ordering::Acquire), "remove returned before the drain");
        assert_eq!(worker.join().unwrap(), Ok(5));
        assert_eq!(list.find(1), Ok(false));
    }
}
