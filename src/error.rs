//! Error types for annotation sets.
//!
//! Misuse of the cursor protocol is a programmer error. The public API panics
//! with the `Display` text of a [`CursorError`] at the point of detection and
//! never tries to roll back a half-applied mutation. Internal corruption is
//! reported by the validator as an [`InvariantViolation`] carrying a full dump
//! of the tree.

use thiserror::Error;

/// A violated precondition of the streaming cursor or a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("begin() called twice with no finish() in between")]
    AlreadyInTransaction,

    #[error("{op}() called outside of a begin()/finish() bracket")]
    NotInTransaction { op: &'static str },

    #[error("finish() called with no matching begin()")]
    UnmatchedFinish,

    #[error("finish() called while annotations are still open: {key}")]
    OpenAnnotationsAtFinish { key: String },

    #[error("endAnnotation() called for key {key} which is not open")]
    AnnotationNotOpen { key: String },

    #[error("{op}() called with a length of zero")]
    ZeroLength { op: &'static str },

    #[error(
        "attempt to {op} beyond end of document (cursor at {cursor}, size is {size}, distance is {distance})"
    )]
    OutOfRange {
        op: &'static str,
        cursor: usize,
        size: usize,
        distance: usize,
    },

    #[error("index {index} out of bounds for size {size}")]
    IndexOutOfBounds { index: usize, size: usize },

    #[error("range {start}..{end} out of bounds for size {size}")]
    InvalidRange { start: usize, end: usize, size: usize },
}

impl CursorError {
    /// Abort with this error as the panic message.
    #[track_caller]
    pub(crate) fn raise(self) -> ! {
        panic!("{}", self);
    }
}

/// A broken structural invariant found by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("tree invariant check failed at node {node}: {description}\n{dump}")]
pub struct InvariantViolation {
    /// Description of the offending node (path, range, colour, local map).
    pub node: String,
    pub description: String,
    /// Full debug dump of the tree at the time of the failure.
    pub dump: String,
}

/// Result alias for validator checks.
pub type Result<T> = std::result::Result<T, InvariantViolation>;

/// Panic unless `start <= end <= size`.
#[track_caller]
pub(crate) fn check_range(start: usize, end: usize, size: usize) {
    if start > end || end > size {
        CursorError::InvalidRange { start, end, size }.raise();
    }
}

/// Panic unless `index < size`.
#[track_caller]
pub(crate) fn check_index(index: usize, size: usize) {
    if index >= size {
        CursorError::IndexOutOfBounds { index, size }.raise();
    }
}
