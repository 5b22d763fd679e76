//! Service runtime: broker connections, topology and consumer supervision.
//!
//! [`Runtime::start`] connects one broker client per service, declares the
//! queues and exchanges that service publishes to or consumes from, and
//! spawns its consumers. Fanout queues are bound before any consumer starts,
//! so broadcasts sent right after startup are not dropped as unroutable.

use std::sync::Arc;

use broker::{BrokerClient, BrokerClientExt, BrokerError, InMemoryBroker};
use common::topology::{
    CLICK_TRACKED_QUEUE, ORDER_CREATED_QUEUE, PAYMENT_COMPLETED_QUEUE, PAYMENT_FAILED_EXCHANGE,
    PAYMENT_INITIATED_QUEUE, PRODUCT_UPDATES_EXCHANGE, REPORT_GENERATED_QUEUE, REPORT_JOB_QUEUE,
    STOCK_RELEASED_QUEUE, STOCK_RESERVED_QUEUE, USER_REGISTERED_QUEUE, fanout_queue_name,
};
use consumer::{ConsumerError, ServiceContext, ShutdownSignal};
use events::{
    ClickTracked, GenerateReportJob, OrderCreated, PaymentFailed, PaymentInitiated,
    ProductUpdated, StockReserved, UserRegistered,
};
use thiserror::Error;
use tokio::task::JoinSet;
use workers::{AnalyticsWorker, CacheWorker, SearchWorker};

use crate::config::{BrokerKind, Config};
use crate::service::Service;
use crate::state::{AppState, Components};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Consumer(#[from] ConsumerError),

    #[error("BROKER=amqp requires building with the `amqp` feature")]
    AmqpDisabled,

    #[error("Consumer task for {service} failed: {reason}")]
    Task { service: Service, reason: String },
}

type ConsumerTask = (Service, &'static str, consumer::Result<()>);

/// The running services of this process.
pub struct Runtime {
    states: Vec<Arc<AppState>>,
    memory: Option<InMemoryBroker>,
    shutdown: ShutdownSignal,
    consumers: JoinSet<ConsumerTask>,
}

impl Runtime {
    /// Connects, declares topology and spawns consumers for every member of
    /// `config.service`.
    pub async fn start(
        config: &Config,
        components: Components,
        shutdown: ShutdownSignal,
    ) -> Result<Self, RuntimeError> {
        let memory = match config.broker {
            BrokerKind::Memory => {
                Some(InMemoryBroker::new().with_dead_letter_capacity(config.dead_letter_capacity))
            }
            BrokerKind::Amqp => None,
        };

        let mut runtime = Self {
            states: Vec::new(),
            memory,
            shutdown,
            consumers: JoinSet::new(),
        };

        for service in config.service.members() {
            let client = runtime.connect(config).await?;
            let ctx = ServiceContext::new(service.as_str(), client, runtime.shutdown.clone())
                .with_settings(config.consumer);

            declare_topology(service, ctx.client().as_ref()).await?;
            runtime.spawn_consumers(service, &ctx, &components)?;
            tracing::info!(service = %service, "service started");

            runtime
                .states
                .push(AppState::new(service, ctx, components.clone()));
        }

        Ok(runtime)
    }

    async fn connect(&self, config: &Config) -> Result<Arc<dyn BrokerClient>, RuntimeError> {
        if let Some(memory) = &self.memory {
            return Ok(Arc::new(memory.connect(&config.connection).await?));
        }
        Self::connect_amqp(config).await
    }

    #[cfg(feature = "amqp")]
    async fn connect_amqp(config: &Config) -> Result<Arc<dyn BrokerClient>, RuntimeError> {
        Ok(Arc::new(broker::AmqpClient::connect(&config.connection).await?))
    }

    #[cfg(not(feature = "amqp"))]
    async fn connect_amqp(_config: &Config) -> Result<Arc<dyn BrokerClient>, RuntimeError> {
        Err(RuntimeError::AmqpDisabled)
    }

    fn spawn_consumers(
        &mut self,
        service: Service,
        ctx: &ServiceContext,
        components: &Components,
    ) -> Result<(), RuntimeError> {
        let sim = components.simulation;
        match service {
            Service::Email => {
                let consumer = ctx.consumer::<UserRegistered, _>(USER_REGISTERED_QUEUE, components.email.clone());
                self.spawn(service, "welcome_email", consumer.run());
            }
            Service::Payment => {
                let initiated = ctx.consumer::<PaymentInitiated, _>(
                    PAYMENT_INITIATED_QUEUE,
                    components.payments.clone(),
                );
                self.spawn(service, "payment_initiated", initiated.run());
                let reserved =
                    ctx.consumer::<StockReserved, _>(STOCK_RESERVED_QUEUE, components.payments.clone());
                self.spawn(service, "payment_stock_reserved", reserved.run());
            }
            Service::Cache => {
                let worker = CacheWorker::new(components.cache.clone()).with_delay(sim.cache_delay);
                let consumer = ctx.fanout_consumer::<ProductUpdated, _>(PRODUCT_UPDATES_EXCHANGE, worker)?;
                self.spawn(service, "cache_invalidate", consumer.run());
            }
            Service::Search => {
                let worker = SearchWorker::new(components.search.clone()).with_delay(sim.search_delay);
                let consumer = ctx.fanout_consumer::<ProductUpdated, _>(PRODUCT_UPDATES_EXCHANGE, worker)?;
                self.spawn(service, "search_reindex", consumer.run());
            }
            Service::Analytics => {
                let worker =
                    AnalyticsWorker::new(components.analytics.clone()).with_delay(sim.analytics_delay);
                let updates =
                    ctx.fanout_consumer::<ProductUpdated, _>(PRODUCT_UPDATES_EXCHANGE, worker.clone())?;
                self.spawn(service, "analytics_product_updated", updates.run());
                let clicks = ctx.consumer::<ClickTracked, _>(CLICK_TRACKED_QUEUE, worker);
                self.spawn(service, "analytics_click_tracked", clicks.run());
            }
            Service::Report => {
                let consumer =
                    ctx.consumer::<GenerateReportJob, _>(REPORT_JOB_QUEUE, components.reports.clone());
                self.spawn(service, "report_generate", consumer.run());
            }
            Service::Order => {
                let consumer =
                    ctx.fanout_consumer::<PaymentFailed, _>(PAYMENT_FAILED_EXCHANGE, components.orders.clone())?;
                self.spawn(service, "order_payment_failed", consumer.run());
            }
            Service::Inventory => {
                let created =
                    ctx.consumer::<OrderCreated, _>(ORDER_CREATED_QUEUE, components.inventory.clone());
                self.spawn(service, "inventory_order_created", created.run());
                let failed = ctx.fanout_consumer::<PaymentFailed, _>(
                    PAYMENT_FAILED_EXCHANGE,
                    components.inventory.clone(),
                )?;
                self.spawn(service, "inventory_payment_failed", failed.run());
            }
            Service::User | Service::Product | Service::All => {}
        }
        Ok(())
    }

    fn spawn<F>(&mut self, service: Service, name: &'static str, run: F)
    where
        F: Future<Output = consumer::Result<()>> + Send + 'static,
    {
        self.consumers.spawn(async move { (service, name, run.await) });
    }

    /// Per-service state, in startup order.
    pub fn states(&self) -> &[Arc<AppState>] {
        &self.states
    }

    /// The in-process broker, when running with `BROKER=memory`.
    pub fn memory_broker(&self) -> Option<&InMemoryBroker> {
        self.memory.as_ref()
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Waits for every consumer to stop, then disconnects.
    ///
    /// The first consumer that fails triggers shutdown of everything else;
    /// its error is returned.
    pub async fn wait(mut self) -> Result<(), RuntimeError> {
        let mut first_error = None;

        while let Some(joined) = self.consumers.join_next().await {
            let failure = match joined {
                Ok((service, name, Ok(()))) => {
                    tracing::debug!(service = %service, consumer = name, "consumer stopped");
                    None
                }
                Ok((service, name, Err(e))) => {
                    tracing::error!(service = %service, consumer = name, error = %e, "consumer failed");
                    Some(RuntimeError::Consumer(e))
                }
                Err(e) => {
                    tracing::error!(error = %e, "consumer task aborted");
                    Some(RuntimeError::Task {
                        service: Service::All,
                        reason: e.to_string(),
                    })
                }
            };

            if let Some(error) = failure {
                metrics::counter!("service_consumer_failures_total").increment(1);
                self.shutdown.trigger();
                first_error.get_or_insert(error);
            }
        }

        for state in &self.states {
            state.ctx.client().disconnect().await;
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Declares every queue and exchange `service` publishes to or consumes from.
///
/// Declarations are idempotent, so services sharing a queue may both declare
/// it.
pub async fn declare_topology(service: Service, client: &dyn BrokerClient) -> Result<(), BrokerError> {
    let (queues, fanouts): (&[&str], &[&str]) = match service {
        Service::User | Service::Email => (&[USER_REGISTERED_QUEUE], &[]),
        Service::Payment => (
            &[PAYMENT_INITIATED_QUEUE, PAYMENT_COMPLETED_QUEUE, STOCK_RESERVED_QUEUE],
            &[PAYMENT_FAILED_EXCHANGE],
        ),
        Service::Product => (&[], &[PRODUCT_UPDATES_EXCHANGE]),
        Service::Cache | Service::Search => (&[], &[]),
        Service::Analytics => (&[CLICK_TRACKED_QUEUE], &[]),
        Service::Report => (&[REPORT_JOB_QUEUE, REPORT_GENERATED_QUEUE], &[]),
        Service::Order => (&[ORDER_CREATED_QUEUE], &[]),
        Service::Inventory => (
            &[ORDER_CREATED_QUEUE, STOCK_RESERVED_QUEUE, STOCK_RELEASED_QUEUE],
            &[],
        ),
        Service::All => (&[], &[]),
    };

    for queue in queues {
        client.declare_durable_queue(queue).await?;
    }
    for exchange in fanouts {
        client.declare_fanout(exchange).await?;
    }

    let subscriptions: &[&str] = match service {
        Service::Cache | Service::Search | Service::Analytics => &[PRODUCT_UPDATES_EXCHANGE],
        Service::Order | Service::Inventory => &[PAYMENT_FAILED_EXCHANGE],
        _ => &[],
    };
    for exchange in subscriptions {
        client
            .subscribe_fanout(&fanout_queue_name(service.as_str(), exchange), exchange)
            .await?;
    }

    tracing::debug!(service = %service, "topology declared");
    Ok(())
}
