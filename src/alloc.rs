//! Node allocation accounting for [`List`](crate::List).
//!
//! The list never calls the global allocator's fallible API directly. Instead
//! every node (and every list's pair of sentinels) is reserved through a
//! [`NodeAllocator`] before it is constructed and released when it is
//! destroyed. This gives the list an allocation-failure path that is reachable
//! and testable: a reservation failure surfaces as [`ListError::Alloc`] before
//! any shared lock is taken.
//!
//! Two implementations are provided:
//!
//! - [`Unbounded`]: never refuses. The default.
//! - [`Bounded`]: a fixed node budget, useful for capping memory and for
//!   exercising the allocation-failure paths in tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::ListError;

/// Reservation failure returned by [`NodeAllocator::try_reserve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError {
    /// Number of nodes that were requested.
    pub requested: usize,
}

impl std::fmt::Display for AllocError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "allocator refused {} node(s)", self.requested)
    }
}

impl std::error::Error for AllocError {}

impl From<AllocError> for ListError {
    fn from(_: AllocError) -> Self {
        Self::Alloc
    }
}

/// Trait for reserving and releasing node storage.
///
/// Implementations must guarantee:
///
/// 1. **Atomicity**: a reservation either succeeds for the full `count` or
///    has no effect.
///
/// 2. **Thread safety**: `try_reserve` and `release` are called concurrently
///    from every thread operating on lists that share the allocator.
///
/// Callers release exactly what they reserved. A list reserves one unit per
/// element and two units for its sentinels.
pub trait NodeAllocator: Send + Sync {
    /// Reserve storage for `count` nodes.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError`] if the reservation cannot be satisfied.
    fn try_reserve(&self, count: usize) -> Result<(), AllocError>;

    /// Return storage for `count` nodes previously reserved.
    fn release(&self, count: usize);
}

// ============================================================================
//  Unbounded
// ============================================================================

/// Allocator that never refuses. Memory comes straight from the global heap.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unbounded;

impl NodeAllocator for Unbounded {
    #[inline]
    fn try_reserve(&self, _count: usize) -> Result<(), AllocError> {
        Ok(())
    }

    #[inline]
    fn release(&self, _count: usize) {}
}

// ============================================================================
//  Bounded
// ============================================================================

/// Allocator with a fixed node budget.
///
/// Sentinels count against the budget, so a list needs at least two units
/// to be created at all.
///
/// # Example
///
/// ```rust
/// use couplist::alloc::{Bounded, NodeAllocator};
///
/// let alloc = Bounded::new(3);
/// assert!(alloc.try_reserve(2).is_ok());
/// assert!(alloc.try_reserve(2).is_err());
/// alloc.release(2);
/// assert_eq!(alloc.live(), 0);
/// ```
#[derive(Debug)]
pub struct Bounded {
    capacity: usize,
    live: AtomicUsize,
}

impl Bounded {
    /// Create an allocator that admits at most `capacity` live nodes.
    #[must_use]
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            live: AtomicUsize::new(0),
        }
    }

    /// Maximum number of live nodes.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of nodes currently reserved.
    #[inline]
    #[must_use]
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

impl NodeAllocator for Bounded {
    fn try_reserve(&self, count: usize) -> Result<(), AllocError> {
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                live.checked_add(count).filter(|&next| next <= self.capacity)
            })
            .map(|_| ())
            .map_err(|_| AllocError { requested: count })
    }

    fn release(&self, count: usize) {
        let previous: usize = self.live.fetch_sub(count, Ordering::AcqRel);
        debug_assert!(previous >= count, "released more nodes than reserved");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_unbounded_never_refuses() {
        let alloc = Unbounded;
        assert!(alloc.try_reserve(usize::MAX).is_ok());
        alloc.release(usize::MAX);
    }

    #[test]
    fn test_bounded_refuses_over_capacity() {
        let alloc = Bounded::new(4);

        assert!(alloc.try_reserve(3).is_ok());
        assert_eq!(
            alloc.try_reserve(2),
            Err(AllocError { requested: 2 }),
            "partial reservations must not be granted"
        );
        assert_eq!(alloc.live(), 3);

        assert!(alloc.try_reserve(1).is_ok());
        assert_eq!(alloc.live(), 4);

        alloc.release(4);
        assert_eq!(alloc.live(), 0);
    }

    #[test]
    fn test_alloc_error_maps_to_list_error() {
        let err: ListError = AllocError { requested: 1 }.into();
        assert_eq!(err, ListError::Alloc);
    }

    #[test]
    fn test_bounded_concurrent_reservations_never_exceed_capacity() {
        let alloc = Arc::new(Bounded::new(100));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let alloc = Arc::clone(&alloc);
                thread::spawn(move || {
                    let mut granted = 0;
                    for _ in 0..50 {
                        if alloc.try_reserve(1).is_ok() {
                            granted += 1;
                        }
                    }
                    granted
                })
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(total, 100);
        assert_eq!(alloc.live(), 100);
    }
}
