//! Error kinds surfaced by every public operation of this crate.
//!
//! The engine never retries internally: a malformed batch aborts and leaves
//! the pre-batch state intact. Every fallible public method returns
//! [`EngineError`] directly rather than boxing it behind [`anyhow::Error`],
//! so callers can match on the concrete kind. The CLI driver (`src/bin/danf.rs`)
//! is the only place that wraps these in [`anyhow::Context`] for
//! human-readable reporting.

use thiserror::Error;

/// The error type returned by every fallible operation in this crate.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A negative growth amount, a shrink request, or any other argument
    /// that is structurally invalid regardless of the current state.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Two counter arrays (or two counters) were asked to interact
    /// (`union`, `merge`, ...) despite having incompatible shapes
    /// (`log2m`, register size, or hasher seed).
    #[error("incompatible counter array shapes: {0}")]
    IncompatibleShape(String),

    /// An operation was attempted on an object in a state that does not
    /// support it, e.g. calling `successors()` on a node iterator before
    /// its first advance, or using an engine after it has been closed.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A graph file could not be read or written.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// `deleteEdge` was called without the transposed graph reference
    /// needed to scan incoming edges of the deleted endpoints.
    #[error("deleteEdge requires a transpose reference")]
    MissingTranspose,

    /// Named per `spec.md` §7's error-kind table. A counter index beyond
    /// the current size is deliberately *not* raised through this variant
    /// on query (`count` returns zero, a valid answer, rather than an
    /// error); it is reserved for lookups where absence is genuinely
    /// exceptional, e.g. a future by-id counter lookup API.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Convenience alias used throughout the crate's public API.
pub type Result<T> = std::result::Result<T, EngineError>;
