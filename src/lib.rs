//! # `couplist`
//!
//! A concurrent, key-ordered map from `i32` keys to arbitrary values, built on
//! a doubly linked chain walked with hand-over-hand ("lock-coupling") locking.
//!
//! ```text
//!  container lock ─ { alive, size, anchor }
//!                               │
//!                               ▼
//!   [HEAD i32::MIN] ⇄ [k1] ⇄ [k2] ⇄ ... ⇄ [kn] ⇄ [TAIL i32::MAX]
//!                      │      │            │
//!                    value  value        value      (one value lock each)
//! ```
//!
//! Every positional operation starts at the head and holds at most two
//! adjacent node locks at a time, so threads working on different regions of
//! the list run in parallel while a thread behind another can never overtake
//! it.
//!
//! ## Operations
//!
//! | Operation | Locks held at the point of action |
//! |-----------|-----------------------------------|
//! | [`List::insert`] | predecessor + successor |
//! | [`List::remove`] | predecessor + victim, then victim's value lock |
//! | [`List::find`] | predecessor + candidate |
//! | [`List::update`] | value lock of the entry |
//! | [`List::compute`] | value lock of the entry, for the whole callback |
//! | [`List::teardown`] | one node at a time, behind every in-flight walk |
//! | [`List::split`] | source head + the node being moved |
//! | [`List::batch`] | whatever each descriptor's operation takes |
//!
//! ## Thread Safety
//!
//! `List<V>` is `Send + Sync` when `V: Send`. Share it with `Arc`:
//!
//! ```rust
//! use std::sync::Arc;
//! use std::thread;
//!
//! use couplist::List;
//!
//! let list: Arc<List<u64>> = Arc::new(List::new());
//!
//! let handles: Vec<_> = (0..4)
//!     .map(|t| {
//!         let list = Arc::clone(&list);
//!         thread::spawn(move || {
//!             for k in 0..100 {
//!                 list.insert(t * 100 + k, u64::from(k.unsigned_abs())).unwrap();
//!             }
//!         })
//!     })
//!     .collect();
//!
//! for h in handles {
//!     h.join().unwrap();
//! }
//! assert_eq!(list.len(), Ok(400));
//! ```
//!
//! ## Lifetime
//!
//! [`List::teardown`] and [`List::split`] consume the chain while other
//! threads may still be using the list. Operations already inside the chain
//! finish first; later ones fail with [`ListError::ListFreed`]. Dropping a
//! list that was never torn down frees its nodes without locking.
//!
//! ## Features
//!
//! - `tracing`: structured logging through the `tracing` crate.
//! - `mimalloc`: mimalloc as the global allocator of the debug binary.

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod alloc;
pub mod batch;
pub mod error;
pub mod transform;

mod list;
mod node;
mod tracing_helpers;

// Re-export main types for convenience
pub use alloc::{AllocError, Bounded, NodeAllocator, Unbounded};
pub use batch::{BatchConfig, BatchExecutor, OpKind, OpResult, Operation, Status};
pub use error::ListError;
pub use list::List;
pub use transform::Transform;
