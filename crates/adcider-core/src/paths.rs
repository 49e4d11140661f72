//! On-disk layout for persisted attribution state.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Retry queue mirror filename.
const RETRY_QUEUE_FILE_NAME: &str = "adcider_retry_queue.json";
/// Delivered transaction id ledger filename.
const SENT_IDS_FILE_NAME: &str = "adcider_sent_transaction_ids.json";
/// File-backed secure storage filename.
const IDENTITY_STORE_FILE_NAME: &str = "adcider_identity.json";

/// Manages file system paths for the SDK.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for all persisted files (~/.adcider)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.adcider`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".adcider"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.adcider).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.adcider/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the retry queue file path (~/.adcider/adcider_retry_queue.json).
    pub fn retry_queue_file(&self) -> PathBuf {
        self.base_dir.join(RETRY_QUEUE_FILE_NAME)
    }

    /// Get the sent transaction ids file path
    /// (~/.adcider/adcider_sent_transaction_ids.json).
    pub fn sent_ids_file(&self) -> PathBuf {
        self.base_dir.join(SENT_IDS_FILE_NAME)
    }

    /// Get the file-backed identity store path (~/.adcider/adcider_identity.json).
    pub fn identity_store_file(&self) -> PathBuf {
        self.base_dir.join(IDENTITY_STORE_FILE_NAME)
    }

    /// Get the logs directory (~/.adcider/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the JSONL log file path (~/.adcider/logs/adcider.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("adcider.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
