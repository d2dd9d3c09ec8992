//! Error types for the report store.
//!
//! Store failures are recovered locally by callers: reads surface as `None`,
//! writes and deletes are logged and dropped. Nothing here is ever allowed
//! to propagate as a crash of the host application.

use thiserror::Error;

/// Ways a store operation can fail.
#[derive(Error, Debug)]
pub enum StoreError
{
    /// Underlying filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted counter sidecar could not be parsed.
    #[error("corrupt store state: {0}")]
    CorruptState(String),
}

/// Convenience alias for `Result<T, StoreError>`
pub type StoreResult<T> = std::result::Result<T, StoreError>;
