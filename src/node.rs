//! Chain nodes.
//!
//! A [`Node`] lives behind its own structural lock (`Arc<Mutex<Node<V>>>`).
//! Guards are taken with [`Mutex::lock_arc`], so a held guard keeps its node
//! alive independently of the link it was reached through. That is what lets
//! a traversal release the predecessor while still holding the current node.
//!
//! # Ownership
//!
//! ```text
//!   head ──next(Arc)──► n1 ──next(Arc)──► n2 ──next(Arc)──► tail
//!   head ◄─prev(Weak)── n1 ◄─prev(Weak)── n2 ◄─prev(Weak)── tail
//! ```
//!
//! Forward links own their successor, back links do not, so the chain has no
//! reference cycles. The payload sits in a separately locked cell so a
//! long-running compute only pins the value, not the chain position.

use std::sync::{Arc, Weak};

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

/// Shared handle to a node's structural lock.
pub(crate) type NodeRef<V> = Arc<Mutex<Node<V>>>;

/// Held structural lock on a node.
pub(crate) type NodeGuard<V> = ArcMutexGuard<RawMutex, Node<V>>;

/// Payload cell guarded by the node's value lock.
pub(crate) type ValueCell<V> = Arc<Mutex<V>>;

/// Held value lock.
pub(crate) type ValueGuard<V> = ArcMutexGuard<RawMutex, V>;

/// Key carried by the head sentinel.
pub(crate) const HEAD_KEY: i32 = i32::MIN;

/// Key carried by the tail sentinel.
pub(crate) const TAIL_KEY: i32 = i32::MAX;

/// Whether `key` collides with a sentinel and can never be stored.
#[inline]
#[must_use]
pub(crate) const fn is_sentinel_key(key: i32) -> bool {
    key == HEAD_KEY || key == TAIL_KEY
}

/// Role of a node in its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Head,
    Tail,
    Entry,
}

/// A single link in the chain.
///
/// Every field is guarded by the structural lock wrapping the node.
pub(crate) struct Node<V> {
    pub(crate) key: i32,
    pub(crate) kind: NodeKind,

    /// `None` for sentinels.
    pub(crate) value: Option<ValueCell<V>>,

    pub(crate) next: Option<NodeRef<V>>,
    pub(crate) prev: Weak<Mutex<Node<V>>>,

    /// Identifier of the list whose chain holds this node.
    pub(crate) owner: u64,

    /// Set once the node has left its chain (teardown, split claim, remove).
    /// A traversal that locks a retired head aborts with `ListFreed`.
    pub(crate) retired: bool,
}

impl<V> Node<V> {
    fn new(key: i32, kind: NodeKind, value: Option<ValueCell<V>>, owner: u64) -> Self {
        Self {
            key,
            kind,
            value,
            next: None,
            prev: Weak::new(),
            owner,
            retired: false,
        }
    }

    /// Create a linked head/tail sentinel pair.
    pub(crate) fn sentinels(owner: u64) -> (NodeRef<V>, NodeRef<V>) {
        let tail: NodeRef<V> =
            Arc::new(Mutex::new(Self::new(TAIL_KEY, NodeKind::Tail, None, owner)));

        let mut head: Self = Self::new(HEAD_KEY, NodeKind::Head, None, owner);
        head.next = Some(Arc::clone(&tail));
        let head: NodeRef<V> = Arc::new(Mutex::new(head));

        tail.lock().prev = Arc::downgrade(&head);
        (head, tail)
    }

    /// Create an unlinked entry node. Its value lock is ready before the node
    /// is ever reachable.
    pub(crate) fn entry(key: i32, value: V, owner: u64) -> NodeRef<V> {
        let cell: ValueCell<V> = Arc::new(Mutex::new(value));
        Arc::new(Mutex::new(Self::new(key, NodeKind::Entry, Some(cell), owner)))
    }

    #[inline]
    pub(crate) fn is_entry(&self) -> bool {
        self.kind == NodeKind::Entry
    }

    #[inline]
    pub(crate) fn is_tail(&self) -> bool {
        self.kind == NodeKind::Tail
    }

    /// Acquire and immediately release the value lock.
    ///
    /// Once this returns no compute or update is still running against the
    /// payload, provided the caller holds the structural lock (nobody can
    /// start a new one without it).
    pub(crate) fn drain(&self) {
        if let Some(cell) = self.value.as_ref() {
            drop(cell.lock());
        }
    }
}

impl<V> std::fmt::Debug for Node<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("owner", &self.owner)
            .field("retired", &self.retired)
            .finish_non_exhaustive()
    }
}

/// Handle to the node behind a held guard.
#[inline]
pub(crate) fn handle_of<V>(guard: &NodeGuard<V>) -> &NodeRef<V> {
    ArcMutexGuard::mutex(guard)
}
