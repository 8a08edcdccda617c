//! Error types for coldsync-core

use thiserror::Error;

/// Result type alias using coldsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in coldsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// The local store could not be created or opened
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A read or write against the local store failed
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Transport failure talking to the remote API
    #[error("Network error: {0}")]
    Network(String),

    /// The remote API rejected the request
    #[error("API error ({status}): {message}")]
    Application { status: u16, message: String },

    /// The remote API reported a version mismatch; see the conflict log
    #[error("Conflict recorded as #{conflict_id}")]
    Conflict { conflict_id: i64 },

    /// The operation was dropped because the one it depends on failed
    #[error("Depends on failed operation #{predecessor}")]
    DependencyFailed { predecessor: i64 },

    /// The waiter for a queued operation was dropped before it settled
    #[error("Operation #{0} was abandoned before it settled")]
    Abandoned(i64),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether a queued operation failing with this error may be replayed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Application { .. })
    }
}
