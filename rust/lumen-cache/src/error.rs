//! Error taxonomy for the cache.

use std::fmt;

/// The three kinds of failure the cache can report as a `Result`.
///
/// `Disabled` and `IoFailure` are always recovered locally by the facade —
/// a miss is a valid answer to `lookup`, a soft failure is a valid answer
/// to `store`. `Corrupt` is handled by resetting the index to empty.
///
/// A fourth category, invariant violations — a bug, which must panic or
/// abort rather than be silently masked — is deliberately absent from this
/// enum: a caller could catch and ignore a `Result`, which defeats the
/// point. Accounting invariants that must never be violated are instead
/// enforced with a direct `panic!`/`assert!` at the point they are checked
/// (see `Index::total_size`).
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The cache is disabled or has not been initialized.
    #[error("cache is disabled")]
    Disabled,

    /// A filesystem operation failed.
    #[error("cache I/O error: {0}")]
    IoFailure(#[from] std::io::Error),

    /// The on-disk index file was malformed and has been reset to empty.
    #[error("cache index corrupt: {0}")]
    Corrupt(String),
}

impl CacheError {
    pub fn corrupt(reason: impl fmt::Display) -> Self {
        CacheError::Corrupt(reason.to_string())
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
