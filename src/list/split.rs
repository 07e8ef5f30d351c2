//! Round-robin partition of a list into `n` new lists.
//!
//! ```text
//! source:   k1 → k2 → k3 → k4 → k5
//! n = 2:    out[0]: k1 → k3 → k5
//!           out[1]: k2 → k4
//! ```
//!
//! Nodes are distributed by position, not by key. Each destination receives
//! its nodes in source order, so every destination stays sorted. Nodes are
//! relinked, never copied; values are not touched.

use std::sync::Arc;

use crate::alloc::NodeAllocator;
use crate::error::ListError;
use crate::node::{NodeGuard, NodeRef, handle_of};
use crate::tracing_helpers::{debug_log, warn_log};

use super::List;
use super::traverse::lock_next;

impl<V, A: NodeAllocator> List<V, A> {
    /// Move every entry into `n` fresh lists, alternating between them, and
    /// invalidate this list.
    ///
    /// The destination lists share this list's allocator. When there are
    /// fewer than `n` entries the surplus destinations are empty.
    ///
    /// The destinations are allocated before the source is claimed. If any
    /// allocation fails the source is left exactly as it was and stays
    /// usable.
    ///
    /// Like [`teardown`](Self::teardown), split waits for operations already
    /// inside the chain and makes later ones fail with
    /// [`ListError::ListFreed`].
    ///
    /// # Errors
    ///
    /// - [`ListError::Param`] if `n == 0`
    /// - [`ListError::Alloc`] if a destination list cannot be allocated
    /// - [`ListError::ListFreed`] if this list was already torn down or split
    pub fn split(&self, n: usize) -> Result<Vec<Self>, ListError> {
        if n == 0 {
            return Err(ListError::Param);
        }

        let mut lists: Vec<Self> = Vec::with_capacity(n);
        for _ in 0..n {
            match Self::try_new_in(Arc::clone(&self.allocator)) {
                Ok(list) => lists.push(list),
                Err(err) => {
                    warn_log!(list = self.id, n, made = lists.len(), "split: allocation failed");
                    return Err(err);
                }
            }
        }

        let mut source_head: NodeGuard<V> = self.claim()?;

        let mut lasts: Vec<NodeGuard<V>> = Vec::with_capacity(n);
        for list in &lists {
            lasts.push(list.lock_head()?);
        }
        let mut counts: Vec<usize> = vec![0; n];
        let mut moved: usize = 0;

        loop {
            // Always detach the first entry, so only the source head and the
            // entry being moved are held on the source side.
            let mut current: NodeGuard<V> = lock_next(&source_head)?;
            if current.is_tail() {
                break;
            }

            source_head.next = current.next.take();

            let slot: usize = moved % n;
            let last: &mut NodeGuard<V> = &mut lasts[slot];
            current.prev = Arc::downgrade(handle_of(last));
            current.next = last.next.take();
            current.owner = lists[slot].id;
            last.next = Some(Arc::clone(handle_of(&current)));

            // Releases the previous last node of this destination.
            *last = current;
            counts[slot] += 1;
            moved += 1;
        }

        for last in lasts {
            let tail: NodeRef<V> = last.next.clone().ok_or(ListError::Failure)?;
            tail.lock().prev = Arc::downgrade(handle_of(&last));
        }
        for (list, count) in lists.iter().zip(counts) {
            list.state.lock().size = count;
        }

        drop(source_head);
        self.allocator.release(2);

        debug_log!(list = self.id, n, moved, "split: done");
        Ok(lists)
    }
}
