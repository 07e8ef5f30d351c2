//! Filepath: src/list.rs
//! [`List`] - a concurrent sorted map over a lock-coupled chain.
//!
//! This module owns the container state (liveness, element count, chain
//! anchor) and the whole-list operations that consume the chain: teardown and
//! drop. Positional operations live in [`ops`], the shared walk in
//! [`traverse`], and the round-robin partition in [`split`].
//!
//! # Lock Order
//!
//! ```text
//! container lock → head → chain order (head to tail) → value lock
//! ```
//!
//! Positional operations release the container lock before requesting any
//! node lock. Teardown and split hold it only while taking the head, and no
//! thread ever waits for the container lock while holding a node lock.

use std::fmt as StdFmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::Mutex;

use crate::alloc::{NodeAllocator, Unbounded};
use crate::error::ListError;
use crate::node::{Node, NodeGuard, NodeRef, handle_of};
use crate::tracing_helpers::{debug_log, error_log, warn_log};

mod ops;
mod split;
mod traverse;

/// Source of per-list identifiers recorded as node owners.
static NEXT_LIST_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
//  ContainerState
// ============================================================================

/// Fields guarded by the container lock.
struct ContainerState<V> {
    /// Cleared once teardown or split has claimed the chain.
    alive: bool,

    /// Number of entry nodes. Exact only at quiescence.
    size: usize,

    /// Head sentinel. Taken by teardown/split so no new traversal can start.
    anchor: Option<NodeRef<V>>,
}

// ============================================================================
//  List
// ============================================================================

/// A concurrent, key-ordered map from `i32` keys to values of type `V`.
///
/// Entries live in a doubly linked chain between two sentinels holding
/// `i32::MIN` and `i32::MAX`. Every positional operation walks the chain
/// hand-over-hand, holding at most two adjacent structural locks, so
/// operations on different regions of the list proceed in parallel.
///
/// Share a list between threads with `Arc<List<V>>`.
///
/// # Example
///
/// ```rust
/// use couplist::List;
///
/// let list: List<&str> = List::new();
/// list.insert(3, "three").unwrap();
/// list.insert(1, "one").unwrap();
///
/// assert!(list.find(3).unwrap());
/// assert_eq!(list.compute(1, &|v: &&str| v.len() as i32), Ok(3));
/// assert_eq!(list.len(), Ok(2));
///
/// list.teardown().unwrap();
/// assert!(list.find(3).is_err());
/// ```
pub struct List<V, A: NodeAllocator = Unbounded> {
    id: u64,
    state: Mutex<ContainerState<V>>,
    allocator: Arc<A>,
}

impl<V> List<V, Unbounded> {
    /// Create an empty list backed by the global heap.
    #[must_use]
    pub fn new() -> Self {
        Self::build(Arc::new(Unbounded))
    }
}

impl<V> Default for List<V, Unbounded> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, A: NodeAllocator> List<V, A> {
    /// Create an empty list whose nodes are reserved through `allocator`.
    ///
    /// # Errors
    ///
    /// [`ListError::Alloc`] if the allocator refuses the two sentinels.
    pub fn try_new_in(allocator: Arc<A>) -> Result<Self, ListError> {
        allocator.try_reserve(2)?;
        Ok(Self::build(allocator))
    }

    /// Construct without reserving. Callers account for the sentinels.
    fn build(allocator: Arc<A>) -> Self {
        let id: u64 = NEXT_LIST_ID.fetch_add(1, AtomicOrdering::Relaxed);
        let (head, _tail) = Node::sentinels(id);

        Self {
            id,
            state: Mutex::new(ContainerState {
                alive: true,
                size: 0,
                anchor: Some(head),
            }),
            allocator,
        }
    }

    /// The allocator shared by this list's nodes.
    #[inline]
    #[must_use]
    pub fn allocator(&self) -> &Arc<A> {
        &self.allocator
    }

    /// Number of entries.
    ///
    /// Exact once all concurrent operations have completed; while they run it
    /// may lag behind splices and unlinks that already happened.
    ///
    /// # Errors
    ///
    /// [`ListError::ListFreed`] after teardown or split.
    pub fn len(&self) -> Result<usize, ListError> {
        let state = self.state.lock();
        if state.alive {
            Ok(state.size)
        } else {
            Err(ListError::ListFreed)
        }
    }

    /// Whether the list holds no entries.
    ///
    /// # Errors
    ///
    /// [`ListError::ListFreed`] after teardown or split.
    pub fn is_empty(&self) -> Result<bool, ListError> {
        self.len().map(|n| n == 0)
    }

    /// Whether teardown or split has claimed this list.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state.lock().alive
    }

    /// Apply a size delta under the container lock.
    fn adjust_size(&self, grow: bool) {
        let mut state = self.state.lock();
        if grow {
            state.size += 1;
        } else {
            state.size = state.size.saturating_sub(1);
        }
    }

    // ========================================================================
    //  Liveness Gate / Claim
    // ========================================================================

    /// Pass the liveness gate and lock the head sentinel.
    ///
    /// The container lock is released before the head lock is requested. A
    /// teardown that slips in between marks the head retired while holding
    /// it, which this method detects after acquiring the head.
    fn lock_head(&self) -> Result<NodeGuard<V>, ListError> {
        let head: NodeRef<V> = {
            let state = self.state.lock();
            match state.anchor.as_ref() {
                Some(head) if state.alive => Arc::clone(head),
                _ => return Err(ListError::ListFreed),
            }
        };

        let guard: NodeGuard<V> = head.lock_arc();
        if guard.retired {
            warn_log!(list = self.id, "lock_head: lost race with teardown");
            return Err(ListError::ListFreed);
        }
        Ok(guard)
    }

    /// Take exclusive ownership of the chain.
    ///
    /// Clears `alive`, takes the anchor and retires the head while holding
    /// the container lock, so no later operation can start a traversal.
    /// In-flight traversals are all ahead of the returned head guard.
    fn claim(&self) -> Result<NodeGuard<V>, ListError> {
        let mut state = self.state.lock();
        if !state.alive {
            return Err(ListError::ListFreed);
        }

        let head: NodeRef<V> = state.anchor.take().ok_or(ListError::Failure)?;
        state.alive = false;
        state.size = 0;

        let mut guard: NodeGuard<V> = head.lock_arc();
        guard.retired = true;
        drop(state);

        debug_log!(list = self.id, "claim: chain claimed");
        Ok(guard)
    }

    // ========================================================================
    //  Teardown
    // ========================================================================

    /// Destroy every entry and invalidate the list.
    ///
    /// Safe to call while other threads are mid-operation: those that already
    /// passed the liveness gate finish first (teardown walks behind them in
    /// chain order), later ones fail with [`ListError::ListFreed`]. Each node
    /// is drained (its value lock acquired and released) before it is freed.
    ///
    /// # Errors
    ///
    /// [`ListError::ListFreed`] if the list was already torn down or split.
    pub fn teardown(&self) -> Result<(), ListError> {
        let mut previous: NodeGuard<V> = self.claim()?;
        let mut reclaimed: usize = 0;

        while let Some(next) = previous.next.take() {
            let mut current: NodeGuard<V> = next.lock_arc();
            drop(next);

            current.retired = true;
            if current.is_entry() {
                current.drain();
                reclaimed += 1;
            }

            // Releases the predecessor; its last owning link is gone.
            previous = current;
        }

        if !previous.is_tail() {
            error_log!(list = self.id, key = previous.key, "teardown: chain ended before tail");
            return Err(ListError::Failure);
        }
        drop(previous);

        self.allocator.release(reclaimed + 2);
        debug_log!(list = self.id, reclaimed, "teardown: done");
        Ok(())
    }

    // ========================================================================
    //  Invariant Checking
    // ========================================================================

    /// Walk the chain and verify its structure. Returns the entry count.
    ///
    /// Checks that keys strictly increase from head to tail, that every back
    /// link points at the actual predecessor, and that every node belongs to
    /// this list. Intended for quiescent lists; concurrent writers may cause
    /// a spurious back-link mismatch but never a missed ordering violation.
    ///
    /// # Errors
    ///
    /// [`ListError::ListFreed`] if the list is gone, [`ListError::Failure`]
    /// on any violation.
    pub fn check_invariants(&self) -> Result<usize, ListError> {
        let mut previous: NodeGuard<V> = self.lock_head()?;
        let mut count: usize = 0;

        loop {
            let next: NodeRef<V> = previous.next.clone().ok_or(ListError::Failure)?;
            let current: NodeGuard<V> = next.lock_arc();

            let ordered: bool = previous.key < current.key;
            let linked: bool = std::sync::Weak::ptr_eq(
                &current.prev,
                &Arc::downgrade(handle_of(&previous)),
            );
            if !ordered || !linked || current.owner != self.id {
                error_log!(
                    list = self.id,
                    prev_key = previous.key,
                    key = current.key,
                    ordered,
                    linked,
                    "check_invariants: violation"
                );
                return Err(ListError::Failure);
            }

            if current.is_tail() {
                return Ok(count);
            }
            count += 1;
            previous = current;
        }
    }
}

impl<V, A: NodeAllocator> Drop for List<V, A> {
    fn drop(&mut self) {
        let Some(head) = self.state.get_mut().anchor.take() else {
            return;
        };

        // Exclusive access: no other thread can hold a node of this chain.
        // Unlink iteratively so long chains do not recurse in `Arc::drop`.
        let mut reclaimed: usize = 0;
        let mut cursor: Option<NodeRef<V>> = head.lock().next.take();
        while let Some(node) = cursor {
            let mut guard = node.lock();
            if guard.is_entry() {
                reclaimed += 1;
            }
            cursor = guard.next.take();
        }

        self.allocator.release(reclaimed + 2);
    }
}

impl<V, A: NodeAllocator> StdFmt::Debug for List<V, A> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        let state = self.state.lock();
        f.debug_struct("List")
            .field("id", &self.id)
            .field("alive", &state.alive)
            .field("size", &state.size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
impl<V, A: NodeAllocator> List<V, A> {
    /// Keys from head to tail. Test-only snapshot.
    pub(crate) fn keys(&self) -> Vec<i32> {
        let mut keys = Vec::new();
        let mut previous = self.lock_head().unwrap();
        loop {
            let next = previous.next.clone().unwrap();
            let current = next.lock_arc();
            if current.is_tail() {
                return keys;
            }
            keys.push(current.key);
            previous = current;
        }
    }
}
