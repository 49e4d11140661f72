//! Product metadata lookup.

use crate::{ProductInfo, SourceResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Looks up product metadata by product id.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn lookup(&self, product_id: &str) -> SourceResult<Option<ProductInfo>>;
}

/// Catalog over a fixed set of products.
#[derive(Debug, Default)]
pub struct StaticProductCatalog {
    products: HashMap<String, ProductInfo>,
}

impl StaticProductCatalog {
    pub fn new(products: impl IntoIterator<Item = ProductInfo>) -> Self {
        Self {
            products: products.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }
}

#[async_trait]
impl ProductCatalog for StaticProductCatalog {
    async fn lookup(&self, product_id: &str) -> SourceResult<Option<ProductInfo>> {
        Ok(self.products.get(product_id).cloned())
    }
}

/// Memoizing wrapper around another catalog.
///
/// Only successful lookups are cached; misses and failures are retried on
/// the next call.
pub struct CachedProductCatalog {
    inner: Arc<dyn ProductCatalog>,
    cache: Mutex<HashMap<String, ProductInfo>>,
}

impl CachedProductCatalog {
    pub fn new(inner: Arc<dyn ProductCatalog>) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Product for `product_id`, or `None` when it cannot be resolved.
    pub async fn product(&self, product_id: &str) -> Option<ProductInfo> {
        if let Some(cached) = self.cache.lock().get(product_id) {
            return Some(cached.clone());
        }

        match self.inner.lookup(product_id).await {
            Ok(Some(product)) => {
                debug!(product_id = %product_id, "Cached product");
                self.cache
                    .lock()
                    .insert(product_id.to_string(), product.clone());
                Some(product)
            }
            Ok(None) => {
                debug!(product_id = %product_id, "Product not found");
                None
            }
            Err(e) => {
                warn!(product_id = %product_id, error = %e, "Failed to fetch product");
                None
            }
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }
}
