//! Collaborators the SDK runs with.

use crate::SdkResult;
use adcider_core::{Config, Paths};
use adcider_outbox::{DeliveryClient, HttpDeliveryClient, SenderConfig};
use adcider_sources::{
    AttributionTokenSource, FileStorage, IdentityProvider, InstallationIdentity, ProductCatalog,
    StaticProductCatalog, UnavailableTokenSource,
};
use std::sync::Arc;

/// Everything [`AttributionSdk`](crate::AttributionSdk) needs from the host.
///
/// [`SdkComponents::load`] gives the on-disk defaults; the `with_*` methods
/// swap in platform or test implementations.
#[derive(Clone)]
pub struct SdkComponents {
    pub paths: Paths,
    pub config: Config,
    pub identity: Arc<dyn IdentityProvider>,
    pub token_source: Arc<dyn AttributionTokenSource>,
    pub catalog: Arc<dyn ProductCatalog>,
    /// `None` delivers over HTTP to `config.backend_url`.
    pub client: Option<Arc<dyn DeliveryClient>>,
}

impl SdkComponents {
    /// Defaults rooted at `~/.adcider`.
    pub fn load() -> SdkResult<Self> {
        Self::with_paths(Paths::new()?)
    }

    /// Defaults rooted at `paths`.
    pub fn with_paths(paths: Paths) -> SdkResult<Self> {
        let config = Config::load(&paths)?;
        let storage = FileStorage::open(paths.identity_store_file())?;

        Ok(Self {
            identity: Arc::new(InstallationIdentity::new(Arc::new(storage))),
            token_source: Arc::new(UnavailableTokenSource),
            catalog: Arc::new(StaticProductCatalog::default()),
            client: None,
            paths,
            config,
        })
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_token_source(mut self, token_source: Arc<dyn AttributionTokenSource>) -> Self {
        self.token_source = token_source;
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn ProductCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_client(mut self, client: Arc<dyn DeliveryClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// The injected client, or an HTTP client built from the config.
    pub(crate) fn delivery_client(&self) -> SdkResult<Arc<dyn DeliveryClient>> {
        if let Some(client) = &self.client {
            return Ok(Arc::clone(client));
        }
        let client = HttpDeliveryClient::new(SenderConfig::from_config(&self.config))?;
        Ok(Arc::new(client))
    }
}
