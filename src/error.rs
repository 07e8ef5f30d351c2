//! Error taxonomy for list operations.
//!
//! Every structural operation reports a [`ListError`] on failure. Each variant
//! maps onto a stable integer code so results can be handed across an FFI or
//! logged in the same numbering the batch descriptors use.

use std::fmt as StdFmt;

/// Operation completed.
pub const SUCCESS: i32 = 0;
/// Invalid argument (sentinel key, zero split count, missing operand).
pub const PARAM_ERROR: i32 = -1;
/// The allocator refused a node or list.
pub const ALLOC_ERROR: i32 = -2;
/// Insert of a key that is already present.
pub const INSERT_ERROR: i32 = -3;
/// Remove of a key that is not present.
pub const REMOVE_ERROR: i32 = -4;
/// Update or compute of a key that is not present.
pub const NOT_FOUND_ERROR: i32 = -5;
/// The list was torn down (or split) while the operation was starting.
pub const LIST_FREED_ERROR: i32 = -6;
/// A chain invariant was observed broken.
pub const FAILURE_ERROR: i32 = -7;

// ============================================================================
//  ListError
// ============================================================================

/// Errors returned by list operations.
///
/// No variant leaves a partial mutation behind: validation and allocation
/// failures happen before any lock is taken, logical failures release their
/// locks without touching the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListError {
    /// Invalid argument.
    Param,

    /// Node or list allocation failed.
    Alloc,

    /// Insert found the key already present.
    DuplicateKey,

    /// Remove did not find the key.
    KeyAbsent,

    /// Update or compute did not find the key.
    NotFound,

    /// The list is no longer alive. The handle must not be used again.
    ListFreed,

    /// Internal invariant violation. Should never be observed.
    Failure,
}

impl ListError {
    /// Stable integer code for this error.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Param => PARAM_ERROR,
            Self::Alloc => ALLOC_ERROR,
            Self::DuplicateKey => INSERT_ERROR,
            Self::KeyAbsent => REMOVE_ERROR,
            Self::NotFound => NOT_FOUND_ERROR,
            Self::ListFreed => LIST_FREED_ERROR,
            Self::Failure => FAILURE_ERROR,
        }
    }

    /// Inverse of [`code`](Self::code). Returns `None` for [`SUCCESS`] and
    /// for values outside the taxonomy.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            PARAM_ERROR => Some(Self::Param),
            ALLOC_ERROR => Some(Self::Alloc),
            INSERT_ERROR => Some(Self::DuplicateKey),
            REMOVE_ERROR => Some(Self::KeyAbsent),
            NOT_FOUND_ERROR => Some(Self::NotFound),
            LIST_FREED_ERROR => Some(Self::ListFreed),
            FAILURE_ERROR => Some(Self::Failure),
            _ => None,
        }
    }
}

impl StdFmt::Display for ListError {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::Param => write!(f, "invalid parameter"),

            Self::Alloc => write!(f, "allocation failed"),

            Self::DuplicateKey => write!(f, "key already present"),

            Self::KeyAbsent => write!(f, "key not present, nothing removed"),

            Self::NotFound => write!(f, "key not found"),

            Self::ListFreed => write!(f, "list has been freed"),

            Self::Failure => write!(f, "list invariant violated"),
        }
    }
}

impl std::error::Error for ListError {}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ListError; 7] = [
        ListError::Param,
        ListError::Alloc,
        ListError::DuplicateKey,
        ListError::KeyAbsent,
        ListError::NotFound,
        ListError::ListFreed,
        ListError::Failure,
    ];

    #[test]
    fn test_codes_are_distinct_and_negative() {
        let mut codes: Vec<i32> = ALL.iter().map(|e| e.code()).collect();
        codes.sort_unstable();
        codes.dedup();

        assert_eq!(codes.len(), ALL.len());
        assert!(codes.iter().all(|&c| c < SUCCESS));
    }

    #[test]
    fn test_from_code_inverts_code() {
        for err in ALL {
            assert_eq!(ListError::from_code(err.code()), Some(err));
        }
        assert_eq!(ListError::from_code(SUCCESS), None);
        assert_eq!(ListError::from_code(42), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(ListError::DuplicateKey.to_string(), "key already present");
        assert_eq!(ListError::ListFreed.to_string(), "list has been freed");
    }
}
