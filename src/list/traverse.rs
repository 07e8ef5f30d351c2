//! Lock-coupling traversal shared by every positional operation.
//!
//! ```text
//!   hold(prev) ─► lock(cur) ─► hold(prev, cur)
//!   advance:      lock(cur.next) ─► unlock(prev) ─► prev = cur, cur = next
//! ```
//!
//! Locks are always taken head to tail and never more than two at a time.
//! Because every traversal starts at the head, this order is total across
//! threads and is the only deadlock-avoidance mechanism needed.

use crate::alloc::NodeAllocator;
use crate::error::ListError;
use crate::node::{NodeGuard, NodeRef, ValueCell};
use crate::tracing_helpers::{error_log, trace_log};

use super::List;

// ============================================================================
//  Window
// ============================================================================

/// Two adjacent, locked nodes with `previous.key < target <= current.key`.
///
/// Dropping the window releases `current` before `previous`.
pub(super) struct Window<V> {
    pub(super) current: NodeGuard<V>,
    pub(super) previous: NodeGuard<V>,
}

impl<V> Window<V> {
    /// Whether `current` is the entry carrying `key`.
    ///
    /// Sentinels never match, even for `i32::MIN`/`i32::MAX`.
    #[inline]
    pub(super) fn matches(&self, key: i32) -> bool {
        self.current.is_entry() && self.current.key == key
    }

    /// Payload cell of the matched entry.
    pub(super) fn value_cell(&self) -> Result<ValueCell<V>, ListError> {
        self.current.value.clone().ok_or(ListError::Failure)
    }
}

/// Lock the successor of a held node.
///
/// Only the tail has no successor, and no traversal advances past the tail,
/// so a missing link means the chain is broken.
pub(super) fn lock_next<V>(held: &NodeGuard<V>) -> Result<NodeGuard<V>, ListError> {
    let Some(next) = held.next.as_ref() else {
        error_log!(key = held.key, "lock_next: chain ends before tail");
        return Err(ListError::Failure);
    };
    let next: NodeRef<V> = next.clone();
    Ok(next.lock_arc())
}

impl<V, A: NodeAllocator> List<V, A> {
    /// Walk from the head to the window for `key`.
    ///
    /// Passes the liveness gate first; the container lock is not held while
    /// any node lock is requested.
    ///
    /// # Errors
    ///
    /// [`ListError::ListFreed`] if the gate fails or the head was retired by
    /// a racing teardown; [`ListError::Failure`] on a broken chain.
    pub(super) fn locate(&self, key: i32) -> Result<Window<V>, ListError> {
        let mut previous: NodeGuard<V> = self.lock_head()?;
        let mut current: NodeGuard<V> = lock_next(&previous)?;

        while current.key < key {
            let next: NodeGuard<V> = lock_next(&current)?;

            // Assignment drops the old `previous` only after `next` is held.
            previous = std::mem::replace(&mut current, next);
        }

        debug_assert_eq!(current.owner, self.id, "node reached through a foreign chain");
        trace_log!(list = self.id, key, stop = current.key, "locate");

        Ok(Window { current, previous })
    }
}
