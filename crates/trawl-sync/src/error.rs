//! Error types for config synchronization.

use thiserror::Error;

/// Errors that can occur while reconciling the jobs file with the store.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The jobs file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The jobs file is not valid JSON, or a job has the wrong shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] trawl_store::StoreError),

    /// A `${NAME}` placeholder has no matching environment variable.
    #[error("missing secret for placeholder: {0}")]
    MissingSecret(String),

    /// The jobs file is valid JSON but not a jobs document.
    #[error("invalid jobs document: {0}")]
    InvalidDocument(String),

    /// A job ended up with no usable notification adapter.
    #[error("job {0} has no valid notification adapter")]
    NoAdapters(String),
}
