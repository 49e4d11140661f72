//! Install attribution token sources.

use crate::{SourceError, SourceResult};
use async_trait::async_trait;

/// Fetches the platform's install attribution token.
#[async_trait]
pub trait AttributionTokenSource: Send + Sync {
    /// `Ok(None)` means the platform had no token to give.
    async fn fetch_token(&self) -> SourceResult<Option<String>>;
}

/// Token source returning a fixed value.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenSource {
    token: Option<String>,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttributionTokenSource for StaticTokenSource {
    async fn fetch_token(&self) -> SourceResult<Option<String>> {
        Ok(self.token.clone())
    }
}

/// Token source for platforms without an attribution service.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableTokenSource;

#[async_trait]
impl AttributionTokenSource for UnavailableTokenSource {
    async fn fetch_token(&self) -> SourceResult<Option<String>> {
        Err(SourceError::Unavailable(
            "Attribution services are only available on iOS and iPadOS.".to_string(),
        ))
    }
}
