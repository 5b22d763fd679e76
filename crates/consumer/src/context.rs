use std::sync::Arc;
use std::time::Duration;

use broker::{BrokerClient, EventPublisher};
use events::Event;

use crate::consumer::Consumer;
use crate::error::Result;
use crate::fanout::FanoutConsumer;
use crate::handler::Handler;
use crate::retry::RetryPolicy;
use crate::shutdown::ShutdownSignal;

/// Tunables shared by every consumer of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerSettings {
    pub retry: RetryPolicy,
    /// How long in-flight handlers may keep running after shutdown.
    pub shutdown_grace: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// Everything a service's consumers and handlers share: the broker client,
/// a publisher on it, the shutdown signal and the consumer settings.
#[derive(Clone)]
pub struct ServiceContext {
    service: Arc<str>,
    client: Arc<dyn BrokerClient>,
    publisher: EventPublisher,
    shutdown: ShutdownSignal,
    settings: ConsumerSettings,
}

impl ServiceContext {
    pub fn new(service: &str, client: Arc<dyn BrokerClient>, shutdown: ShutdownSignal) -> Self {
        Self {
            service: Arc::from(service),
            publisher: EventPublisher::new(Arc::clone(&client)),
            client,
            shutdown,
            settings: ConsumerSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ConsumerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Service name, used for fanout queue names and consumer tags.
    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn client(&self) -> &Arc<dyn BrokerClient> {
        &self.client
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    pub fn shutdown(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    pub fn settings(&self) -> &ConsumerSettings {
        &self.settings
    }

    /// Builds a consumer for a point-to-point queue.
    pub fn consumer<E, H>(&self, queue: &str, handler: H) -> Consumer<E, H>
    where
        E: Event,
        H: Handler<E> + 'static,
    {
        Consumer::new(self.clone(), queue, handler)
    }

    /// Builds a consumer with this service's own queue on a fanout exchange.
    pub fn fanout_consumer<E, H>(&self, exchange: &str, handler: H) -> Result<FanoutConsumer<E, H>>
    where
        E: Event,
        H: Handler<E> + 'static,
    {
        FanoutConsumer::new(self.clone(), exchange, handler)
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("service", &self.service)
            .field("connected", &self.client.is_connected())
            .field("settings", &self.settings)
            .finish()
    }
}
