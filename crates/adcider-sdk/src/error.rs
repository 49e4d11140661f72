//! SDK error types.

use thiserror::Error;

/// Errors surfaced to the host application.
#[derive(Error, Debug)]
pub enum SdkError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    #[error(transparent)]
    Core(#[from] adcider_core::CoreError),

    #[error(transparent)]
    Outbox(#[from] adcider_outbox::OutboxError),

    #[error(transparent)]
    Source(#[from] adcider_sources::SourceError),
}

pub type SdkResult<T> = Result<T, SdkError>;
