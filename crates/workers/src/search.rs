//! Search index kept up to date from product updates.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::ProductId;
use consumer::{Handler, HandlerError, ServiceContext};
use events::{ProductUpdated, Timestamp};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchDocument {
    pub product_id: ProductId,
    pub name: String,
    pub stock: i64,
    #[serde(with = "events::timestamp")]
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    documents: Arc<RwLock<BTreeMap<ProductId, SearchDocument>>>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the product's document.
    pub fn upsert(&self, document: SearchDocument) {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(document.product_id, document);
    }

    pub fn get(&self, product_id: ProductId) -> Option<SearchDocument> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&product_id)
            .cloned()
    }

    /// Case-insensitive substring match on product names.
    pub fn search(&self, query: &str) -> Vec<SearchDocument> {
        let query = query.to_lowercase();
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|doc| doc.name.to_lowercase().contains(&query))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.documents.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct SearchWorker {
    index: SearchIndex,
    delay: Duration,
}

impl SearchWorker {
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(100);

    pub fn new(index: SearchIndex) -> Self {
        Self {
            index,
            delay: Self::DEFAULT_DELAY,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn index(&self) -> &SearchIndex {
        &self.index
    }
}

#[async_trait]
impl Handler<ProductUpdated> for SearchWorker {
    fn name(&self) -> &'static str {
        "search_reindex"
    }

    #[tracing::instrument(skip(self, event, _ctx), fields(product_id = %event.product_id))]
    async fn handle(&self, event: ProductUpdated, _ctx: &ServiceContext) -> Result<(), HandlerError> {
        tokio::time::sleep(self.delay).await;
        self.index.upsert(SearchDocument {
            product_id: event.product_id,
            name: event.name,
            stock: event.stock,
            updated_at: event.timestamp,
        });
        tracing::info!(stock = event.stock, "product reindexed");
        metrics::counter!("search_reindexed_total").increment(1);
        Ok(())
    }
}
