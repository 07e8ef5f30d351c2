//! The value transform invoked by [`List::compute`](crate::List::compute).

/// Maps a stored value to an integer.
///
/// Implemented for every `Fn(&V) -> i32 + Send + Sync`, so closures and plain
/// functions can be passed directly. The list holds the entry's value lock for
/// the whole call: concurrent computes on the same key are serialized, and a
/// remove of that key waits for the call to return.
pub trait Transform<V: ?Sized>: Send + Sync {
    /// Evaluate the transform against `value`.
    fn evaluate(&self, value: &V) -> i32;
}

impl<V: ?Sized, F> Transform<V> for F
where
    F: Fn(&V) -> i32 + Send + Sync,
{
    #[inline]
    fn evaluate(&self, value: &V) -> i32 {
        self(value)
    }
}
