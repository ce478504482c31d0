//! Error taxonomy for the core data model.
//!
//! The five kinds mirror the propagation policy: a [`CoreError`] is never
//! silently reinterpreted as a different variant. Parsing failures are
//! always [`CoreError::BadFormat`]; a traversal that needs a cell it cannot
//! find is always [`CoreError::MissingData`]. The core never logs these —
//! it returns them to the caller.

use thiserror::Error;

use crate::hash::Hash;

/// Errors produced by cell construction, parsing, and traversal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A byte sequence does not decode to a canonical cell.
    ///
    /// Never retried — the caller must discard the bytes. `pos` is the byte
    /// offset at which the deviation was detected; `reason` is a short,
    /// human-readable description (not intended to be parsed).
    #[error("bad format at byte {pos}: {reason}")]
    BadFormat {
        /// Byte offset at which the canonical-form violation was detected.
        pos: usize,
        /// Human-readable description of the violation.
        reason: String,
    },

    /// A traversal needs a cell that is not present in memory or in any
    /// store consulted.
    ///
    /// Recoverable: a higher layer may fetch `hash` from a peer and retry.
    #[error("missing data for hash {0}")]
    MissingData(Hash),

    /// A decoded cell violates a structural invariant (for example, an
    /// address with a negative value, or a set entry that is not `TRUE`).
    ///
    /// Treated as [`CoreError::BadFormat`] when it originates from external
    /// bytes; a bug if produced by in-process construction.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A random-access operation addressed a sequence outside `[0, count)`.
    ///
    /// A programming error, not recovered.
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds {
        /// The offending index.
        index: u64,
        /// The length of the sequence that was indexed.
        len: u64,
    },

    /// An operation was given cell kinds it cannot combine (for example,
    /// intersecting a set with a non-set).
    ///
    /// A programming error, not recovered.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl CoreError {
    /// Construct a [`CoreError::BadFormat`] at the given position.
    pub fn bad_format(pos: usize, reason: impl Into<String>) -> Self {
        Self::BadFormat {
            pos,
            reason: reason.into(),
        }
    }
}
