//! Source error types.

use thiserror::Error;

/// Error type for identity, token and transaction sources.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Backing store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Attribution token could not be fetched
    #[error("Attribution token error: {0}")]
    Token(String),

    /// The platform has no attribution service
    #[error("Attribution unavailable: {0}")]
    Unavailable(String),

    /// A transaction failed verification
    #[error("Transaction verification failed: {0}")]
    Verification(String),

    /// Product metadata lookup failed
    #[error("Product lookup failed: {0}")]
    Product(String),
}

/// Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;
