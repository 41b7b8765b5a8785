//! Error types for session operations
//!
//! Missing sessions are not errors: lookups return `None`, deletions return
//! `false` and bulk operations return `0`.

/// Error types for session lifecycle operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Caller supplied an unusable value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The session store failed
    #[error("Session store failure: {0}")]
    StoreFailure(#[from] anyhow::Error),
}
