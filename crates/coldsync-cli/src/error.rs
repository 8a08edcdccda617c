use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] coldsync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid JSON for {field}: {message}")]
    InvalidJson { field: &'static str, message: String },
    #[error("Queued operation not found: #{0}")]
    OperationNotFound(i64),
    #[error("Conflict not found: #{0}")]
    ConflictNotFound(i64),
    #[error("Conflict #{0} is already resolved")]
    ConflictAlreadyResolved(i64),
    #[error("Merge resolution requires --data")]
    MergeDataRequired,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "API is not configured. Run `coldsync config init --api-base-url <URL>` or set COLDSYNC_API_URL."
    )]
    ApiNotConfigured,
}
