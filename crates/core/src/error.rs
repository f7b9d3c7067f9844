//! Engine-wide error model.
//!
//! This stays focused on the Persistence Gateway's failure kinds plus the
//! handful of generic faults every component can hit (bad identifiers,
//! storage I/O). Submission-specific and scheduler-init-specific failures
//! live closer to where they're raised (see `warden-infra`), matching the
//! taxonomy: local, typed errors at each boundary rather than one
//! everything-enum.

use thiserror::Error;

/// Result type used across the engine.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A flag insert collided on `flag_data` or `seed`.
    #[error("already exists")]
    AlreadyExistent,

    /// A lookup (flag, team, stolen-flag claim, ...) found nothing.
    #[error("not found")]
    NotExistent,

    /// `update_points` was called with an invalid `PointsKind`/target pair.
    #[error("invalid update: {0}")]
    InvalidUpdate(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A value failed validation (e.g. malformed configuration).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A storage-layer fault (connection, I/O, serialization).
    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn invalid_update(msg: impl Into<String>) -> Self {
        Self::InvalidUpdate(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}
