//! Unified error type for the compound file engine.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CfbError>;

/// Disjoint error taxonomy for all fallible engine operations.
#[derive(Debug, Error)]
pub enum CfbError {
    /// Signature mismatch or unsupported major/minor version.
    #[error("not a valid compound file: {0}")]
    FileFormat(String),

    /// An on-disk invariant was violated while parsing or walking structures.
    #[error("corrupted compound file: {0}")]
    Corrupted(String),

    /// A named storage or stream does not exist under its parent.
    #[error("item not found: {0}")]
    ItemNotFound(String),

    /// Insertion of an entry whose key already exists under the same parent.
    #[error("duplicated entry: {0}")]
    Duplicated(String),

    /// An operation that is not valid given the engine's current mode or version.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Operation attempted after the engine was closed.
    #[error("operation on a disposed compound file")]
    Disposed,

    /// Propagated I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Validation failure with no finer-grained tag.
    #[error("validation error: {0}")]
    Generic(String),
}
