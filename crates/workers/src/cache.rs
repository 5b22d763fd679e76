//! Product cache and the worker that invalidates it.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::ProductId;
use consumer::{Handler, HandlerError, ServiceContext};
use events::ProductUpdated;

/// A cached product read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedProduct {
    pub product_id: ProductId,
    pub name: String,
    pub stock: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ProductCache {
    entries: Arc<RwLock<HashMap<ProductId, CachedProduct>>>,
}

impl ProductCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, product: CachedProduct) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(product.product_id, product);
    }

    pub fn get(&self, product_id: ProductId) -> Option<CachedProduct> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&product_id)
            .cloned()
    }

    /// Drops the entry. Returns whether one was present.
    pub fn invalidate(&self, product_id: ProductId) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&product_id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Invalidates the cache entry of every updated product.
#[derive(Debug, Clone)]
pub struct CacheWorker {
    cache: ProductCache,
    delay: Duration,
}

impl CacheWorker {
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(50);

    pub fn new(cache: ProductCache) -> Self {
        Self {
            cache,
            delay: Self::DEFAULT_DELAY,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn cache(&self) -> &ProductCache {
        &self.cache
    }
}

#[async_trait]
impl Handler<ProductUpdated> for CacheWorker {
    fn name(&self) -> &'static str {
        "cache_invalidate"
    }

    #[tracing::instrument(skip(self, event, _ctx), fields(product_id = %event.product_id))]
    async fn handle(&self, event: ProductUpdated, _ctx: &ServiceContext) -> Result<(), HandlerError> {
        tokio::time::sleep(self.delay).await;
        let evicted = self.cache.invalidate(event.product_id);
        tracing::info!(evicted, name = %event.name, "cache invalidated");
        metrics::counter!("cache_invalidations_total").increment(1);
        Ok(())
    }
}
