//! SDK lifecycle.

use crate::{SdkComponents, SdkError, SdkResult};
use adcider_outbox::{AttributionOutbox, OutboxConfig};
use adcider_sources::{
    AttributionReporter, CachedProductCatalog, TransactionObserver, TransactionStream,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Options passed by the host application at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkOptions {
    pub api_key: String,
    pub enable_debug_logging: bool,
}

impl SdkOptions {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            enable_debug_logging: false,
        }
    }

    pub fn with_debug_logging(mut self, enabled: bool) -> Self {
        self.enable_debug_logging = enabled;
        self
    }
}

struct Running {
    options: SdkOptions,
    outbox: AttributionOutbox,
    observer: TransactionObserver,
}

/// Entry point for the host application.
pub struct AttributionSdk {
    components: SdkComponents,
    running: Mutex<Option<Running>>,
}

impl AttributionSdk {
    pub fn new(components: SdkComponents) -> Self {
        Self {
            components,
            running: Mutex::new(None),
        }
    }

    /// Start delivery, report the install token and observe `transactions`.
    pub async fn initialize(&self, options: SdkOptions, transactions: TransactionStream) -> SdkResult<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(SdkError::InitializationFailed("SDK already initialized".to_string()));
        }
        if options.api_key.is_empty() {
            return Err(SdkError::InvalidConfiguration("API key cannot be empty".to_string()));
        }

        let SdkComponents {
            paths,
            config,
            identity,
            token_source,
            catalog,
            ..
        } = &self.components;

        let level = if options.enable_debug_logging {
            "debug"
        } else {
            config.log_level.as_str()
        };
        let log_path = match paths.ensure_dirs() {
            Ok(()) => Some(paths.log_file()),
            Err(e) => {
                warn!(error = %e, "Log directory unavailable, logging to stderr only");
                None
            }
        };
        adcider_core::init_logging(level, log_path);
        info!("Initializing AdCider Attribution SDK");

        let outbox = AttributionOutbox::new(
            OutboxConfig::from_config(config, paths),
            self.components.delivery_client()?,
        );
        outbox.configure(&options.api_key).await?;
        outbox.start().await;

        let reporter = AttributionReporter::new(Arc::clone(identity), Arc::clone(token_source), outbox.clone());
        reporter.start().await;

        let observer = TransactionObserver::new(
            Arc::clone(identity),
            Arc::new(CachedProductCatalog::new(Arc::clone(catalog))),
            outbox.clone(),
        );
        observer.start(transactions);

        *running = Some(Running {
            options,
            outbox,
            observer,
        });
        info!("AdCider Attribution SDK initialized successfully");
        Ok(())
    }

    /// Tear everything down. Does nothing when not initialized.
    ///
    /// The observer stops before the outbox is cleaned, so no transaction
    /// reaches the engine after its state is dropped.
    pub async fn deinitialize(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };

        running.observer.stop();
        running.outbox.cleanup().await;
        info!("AdCider Attribution SDK deinitialized");
    }

    pub async fn is_initialized(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub async fn api_key(&self) -> Option<String> {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|r| r.options.api_key.clone())
    }

    pub async fn debug_logging_enabled(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| r.options.enable_debug_logging)
    }

    /// The running outbox, for flushing or inspection.
    pub async fn outbox(&self) -> Option<AttributionOutbox> {
        self.running.lock().await.as_ref().map(|r| r.outbox.clone())
    }
}
