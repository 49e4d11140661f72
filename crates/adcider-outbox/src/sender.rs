//! Collector delivery over HTTP.

use crate::{BatchPayload, OutboxError, OutboxResult};
use adcider_core::Config;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, info};

/// Fixed user agent sent with every request.
pub const USER_AGENT: &str = "AdCiderAttribution/1.0";

/// Header carrying the API key.
const API_KEY_HEADER: &str = "X-API-KEY";

/// Sends one batch, once.
///
/// There is no partial success: `Ok(())` means the collector accepted the
/// whole batch, any error means none of it should be considered delivered.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn send(&self, batch: &BatchPayload, api_key: Option<&str>) -> OutboxResult<()>;
}

/// Sender configuration.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Collector URL receiving the POST.
    pub endpoint_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            endpoint_url: adcider_core::DEFAULT_BACKEND_URL.to_string(),
            timeout_secs: adcider_core::DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl SenderConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint_url: config.backend_url.clone(),
            timeout_secs: config.request_timeout_secs,
        }
    }
}

/// `reqwest`-backed [`DeliveryClient`] issuing a single JSON POST.
pub struct HttpDeliveryClient {
    config: SenderConfig,
    client: Client,
}

impl HttpDeliveryClient {
    /// Create a new HTTP delivery client.
    pub fn new(config: SenderConfig) -> OutboxResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { config, client })
    }

    pub fn endpoint_url(&self) -> &str {
        &self.config.endpoint_url
    }
}

#[async_trait]
impl DeliveryClient for HttpDeliveryClient {
    async fn send(&self, batch: &BatchPayload, api_key: Option<&str>) -> OutboxResult<()> {
        let body = serde_json::to_vec(batch).map_err(|e| {
            error!(error = %e, "Failed to encode request");
            OutboxError::from(e)
        })?;

        debug!(
            url = %self.config.endpoint_url,
            uid = %batch.uid,
            transactions = batch.transactions.len(),
            "Sending POST"
        );
        debug!(payload = %String::from_utf8_lossy(&body), "Request payload");

        let mut request = self
            .client
            .post(&self.config.endpoint_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(key) = api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await.map_err(|e| {
            error!(error = %e, "Network request failed");
            OutboxError::from(e)
        })?;

        let status = response.status();
        if status.is_success() {
            info!(status = status.as_u16(), "Request succeeded");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        error!(status = status.as_u16(), response = %body, "Server returned error status");
        Err(OutboxError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
