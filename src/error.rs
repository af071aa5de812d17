//! Error Module - Treadgc Error Types
//!
//! Defines the error taxonomy from the error-handling design: out-of-memory
//! is the only kind ever returned to the mutator; every other kind indicates
//! a structural invariant violation and is fatal by construction.

use thiserror::Error;

/// Errors surfaced by the collector's internal, fallible plumbing.
///
/// Out-of-memory is recoverable and reaches the mutator as `None` from the
/// public `alloc`-family functions. Every other variant is raised through
/// `panic!` with a formatted dump (see `heap::GlobalState::abort`) rather
/// than propagated, matching the error-handling design's "abort with a
/// diagnostic" semantics for structural bugs.
#[derive(Debug, Error)]
pub enum TmError {
    #[error("out of memory: requested {requested} bytes, soft ceiling allows {available} more")]
    OutOfMemory { requested: usize, available: usize },

    #[error("collector invariant violation: {0}")]
    InvariantViolation(String),

    #[error("spurious sweep: unmarked cell found where none was expected: {0}")]
    SpuriousSweep(String),

    #[error("misuse: {0}")]
    Misuse(String),

    #[error("pointer classification error: {0}")]
    Classifier(String),

    #[error("root range error: {0}")]
    InvalidRoot(String),
}

impl TmError {
    /// Out-of-memory is the only error kind exposed to the mutator without a panic.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TmError::OutOfMemory { .. })
    }

    /// Everything else indicates a bug in the barrier, classifier, or caller.
    pub fn is_bug(&self) -> bool {
        !self.is_recoverable()
    }
}

pub type Result<T> = std::result::Result<T, TmError>;
