//! Shared application state for the HTTP handlers and consumers.

use std::sync::Arc;
use std::time::Duration;

use consumer::ServiceContext;
use saga::{
    InMemoryInventoryStore, InMemoryOrderStore, InventoryParticipant, OrderParticipant,
    PaymentParticipant, PaymentSettings,
};
use workers::{
    AnalyticsStore, EmailWorker, ProductCache, ReportSettings, ReportStore, ReportWorker,
    SearchIndex, SimulatedMailer,
};

use crate::records::{InMemoryProductStore, InMemoryUserStore};
use crate::service::Service;

/// Simulated latencies of the handlers and background work.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Simulation {
    pub payment: PaymentSettings,
    pub report: ReportSettings,
    pub email_delay: Duration,
    pub cache_delay: Duration,
    pub search_delay: Duration,
    pub analytics_delay: Duration,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            payment: PaymentSettings::default(),
            report: ReportSettings::default(),
            email_delay: SimulatedMailer::DEFAULT_DELAY,
            cache_delay: workers::CacheWorker::DEFAULT_DELAY,
            search_delay: workers::SearchWorker::DEFAULT_DELAY,
            analytics_delay: workers::AnalyticsWorker::DEFAULT_DELAY,
        }
    }
}

impl Simulation {
    /// No artificial delays and a near-instant report loop.
    pub fn immediate() -> Self {
        Self {
            payment: PaymentSettings::immediate(),
            report: ReportSettings {
                duration: Duration::from_millis(5),
                ..ReportSettings::default()
            },
            email_delay: Duration::ZERO,
            cache_delay: Duration::ZERO,
            search_delay: Duration::ZERO,
            analytics_delay: Duration::ZERO,
        }
    }
}

/// Stores and participants of every service.
///
/// Cloning is cheap; clones share the same underlying stores. In a
/// single-service process only the parts belonging to that service are used.
#[derive(Clone)]
pub struct Components {
    pub simulation: Simulation,
    pub users: InMemoryUserStore,
    pub products: InMemoryProductStore,
    pub order_store: InMemoryOrderStore,
    pub orders: OrderParticipant,
    pub inventory_store: InMemoryInventoryStore,
    pub inventory: InventoryParticipant,
    pub payments: PaymentParticipant,
    pub reports: ReportWorker,
    pub analytics: AnalyticsStore,
    pub cache: ProductCache,
    pub search: SearchIndex,
    pub mailer: SimulatedMailer,
    pub email: EmailWorker,
}

impl Components {
    pub fn new(simulation: Simulation) -> Self {
        let order_store = InMemoryOrderStore::new();
        let inventory_store = InMemoryInventoryStore::new();
        let mailer = SimulatedMailer::new(simulation.email_delay);

        Self {
            simulation,
            users: InMemoryUserStore::new(),
            products: InMemoryProductStore::seeded(),
            orders: OrderParticipant::new(Arc::new(order_store.clone())),
            order_store,
            inventory: InventoryParticipant::new(Arc::new(inventory_store.clone())),
            inventory_store,
            payments: PaymentParticipant::new(simulation.payment),
            reports: ReportWorker::new(simulation.report, ReportStore::new()),
            analytics: AnalyticsStore::new(),
            cache: ProductCache::new(),
            search: SearchIndex::new(),
            email: EmailWorker::new(Arc::new(mailer.clone())),
            mailer,
        }
    }
}

impl Default for Components {
    fn default() -> Self {
        Self::new(Simulation::default())
    }
}

/// State handed to one service's router.
pub struct AppState {
    pub service: Service,
    pub ctx: ServiceContext,
    pub components: Components,
}

impl AppState {
    pub fn new(service: Service, ctx: ServiceContext, components: Components) -> Arc<Self> {
        Arc::new(Self {
            service,
            ctx,
            components,
        })
    }

    /// Whether this service's broker connection is usable.
    pub fn broker_connected(&self) -> bool {
        self.ctx.client().is_connected()
    }
}
