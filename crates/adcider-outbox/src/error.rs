//! Outbox error types.

use std::path::PathBuf;
use thiserror::Error;

/// Outbox error type.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// Missing or empty identity / credential, rejected before any I/O
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level HTTP error (connect, TLS, timeout)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Collector answered with a non-2xx status
    #[error("Delivery rejected: HTTP {status}: {body}")]
    Rejected {
        /// Response status code.
        status: u16,
        /// Response body, kept for diagnosis.
        body: String,
    },

    /// The delivery task panicked or was cancelled before answering
    #[error("Delivery aborted: {0}")]
    DeliveryAborted(String),

    /// Reading or writing a persisted mirror failed
    #[error("Persistence error at {path}: {source}")]
    Persistence {
        /// File being read or written.
        path: PathBuf,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A retry entry used up its attempts
    #[error("Max retry attempts ({attempts}) reached for uid {uid}")]
    ExhaustedRetries {
        /// Installation id of the abandoned batch.
        uid: String,
        /// Attempts made.
        attempts: u32,
    },
}

impl OutboxError {
    /// Whether a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OutboxError::Http(_) | OutboxError::Rejected { .. } | OutboxError::DeliveryAborted(_)
        )
    }
}

/// Result type alias using OutboxError.
pub type OutboxResult<T> = Result<T, OutboxError>;
