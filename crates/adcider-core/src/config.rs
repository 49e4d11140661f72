//! Configuration for the attribution SDK.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Collector endpoint (can be overridden at compile time via ADCIDER_BACKEND_URL).
pub const DEFAULT_BACKEND_URL: &str = match option_env!("ADCIDER_BACKEND_URL") {
    Some(url) => url,
    None => "https://app.adcider.com/app-api/attribution",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "warning";

/// Per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Sweep attempts before a failed batch is abandoned.
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;

/// Backoff base delay.
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 60;

/// Backoff cap.
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 3600;

/// SDK configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (debug, info, warning, error, none).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Collector URL that receives attribution batches.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    /// Host application bundle identifier, sent as `bundleId`.
    #[serde(default)]
    pub bundle_id: Option<String>,
    /// Timeout applied to each delivery attempt.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Sweep attempts before a failed batch is dropped.
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    /// Base delay for retry sweeps.
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    /// Upper bound for retry sweep delays.
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_max_retry_attempts() -> u32 {
    DEFAULT_MAX_RETRY_ATTEMPTS
}

fn default_backoff_base_secs() -> u64 {
    DEFAULT_BACKOFF_BASE_SECS
}

fn default_backoff_max_secs() -> u64 {
    DEFAULT_BACKOFF_MAX_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            backend_url: default_backend_url(),
            bundle_id: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            backoff_base_secs: DEFAULT_BACKOFF_BASE_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Check invariants the delivery engine relies on.
    pub fn validate(&self) -> CoreResult<()> {
        self.backend_url()?;
        if self.request_timeout_secs == 0 {
            return Err(CoreError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_retry_attempts == 0 {
            return Err(CoreError::Config(
                "max_retry_attempts must be greater than zero".to_string(),
            ));
        }
        if self.backoff_base_secs > self.backoff_max_secs {
            return Err(CoreError::Config(format!(
                "backoff_base_secs ({}) exceeds backoff_max_secs ({})",
                self.backoff_base_secs, self.backoff_max_secs
            )));
        }
        Ok(())
    }

    /// Override configuration from environment variables.
    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply `ADCIDER_LOG_LEVEL` / `ADCIDER_BACKEND_URL` style overrides from
    /// `lookup`. Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(log_level) = non_empty("ADCIDER_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Some(backend_url) = non_empty("ADCIDER_BACKEND_URL") {
            self.backend_url = backend_url;
        }
    }

    /// Get the collector URL as a parsed URL.
    pub fn backend_url(&self) -> CoreResult<Url> {
        Url::parse(&self.backend_url).map_err(CoreError::from)
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Backoff base delay.
    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }

    /// Backoff cap.
    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }
}
