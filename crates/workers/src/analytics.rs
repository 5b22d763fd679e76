//! Analytics: product activity from the fanout and click counts.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::ProductId;
use consumer::{Handler, HandlerError, ServiceContext};
use events::{ClickTracked, ProductUpdated, Timestamp};
use serde::Serialize;

/// Latest known state of a product plus how many updates were seen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductActivity {
    pub product_id: ProductId,
    pub name: String,
    pub stock: i64,
    pub last_updated: Timestamp,
    pub updates: u64,
}

#[derive(Debug, Default)]
struct AnalyticsState {
    products: HashMap<ProductId, ProductActivity>,
    clicks: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default)]
pub struct AnalyticsStore {
    state: Arc<RwLock<AnalyticsState>>,
}

impl AnalyticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an update. Older updates than the stored one bump the counter
    /// but do not overwrite the snapshot.
    pub fn record_update(&self, event: &ProductUpdated) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let activity = state
            .products
            .entry(event.product_id)
            .or_insert_with(|| ProductActivity {
                product_id: event.product_id,
                name: event.name.clone(),
                stock: event.stock,
                last_updated: event.timestamp,
                updates: 0,
            });
        activity.updates += 1;
        if event.timestamp >= activity.last_updated {
            activity.name.clone_from(&event.name);
            activity.stock = event.stock;
            activity.last_updated = event.timestamp;
        }
    }

    pub fn record_click(&self, page: &str) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state.clicks.entry(page.to_string()).or_default() += 1;
    }

    pub fn product(&self, product_id: ProductId) -> Option<ProductActivity> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .products
            .get(&product_id)
            .cloned()
    }

    /// Clicks per page, sorted by page.
    pub fn clicks(&self) -> BTreeMap<String, u64> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clicks
            .clone()
    }

    pub fn total_clicks(&self) -> u64 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clicks
            .values()
            .sum()
    }
}

/// Handles both `ProductUpdated` (fanout) and `ClickTracked`.
#[derive(Debug, Clone)]
pub struct AnalyticsWorker {
    store: AnalyticsStore,
    delay: Duration,
}

impl AnalyticsWorker {
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(50);

    pub fn new(store: AnalyticsStore) -> Self {
        Self {
            store,
            delay: Self::DEFAULT_DELAY,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn store(&self) -> &AnalyticsStore {
        &self.store
    }
}

#[async_trait]
impl Handler<ProductUpdated> for AnalyticsWorker {
    fn name(&self) -> &'static str {
        "analytics_product_updated"
    }

    #[tracing::instrument(skip(self, event, _ctx), fields(product_id = %event.product_id))]
    async fn handle(&self, event: ProductUpdated, _ctx: &ServiceContext) -> Result<(), HandlerError> {
        tokio::time::sleep(self.delay).await;
        self.store.record_update(&event);
        tracing::info!(name = %event.name, "product analytics logged");
        Ok(())
    }
}

#[async_trait]
impl Handler<ClickTracked> for AnalyticsWorker {
    fn name(&self) -> &'static str {
        "analytics_click"
    }

    async fn handle(&self, event: ClickTracked, _ctx: &ServiceContext) -> Result<(), HandlerError> {
        self.store.record_click(&event.page);
        tracing::debug!(user_id = %event.user_id, page = %event.page, "click tracked");
        metrics::counter!("analytics_clicks_total").increment(1);
        Ok(())
    }
}
