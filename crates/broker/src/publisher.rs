use std::sync::Arc;

use events::Event;

use crate::client::BrokerClient;
use crate::envelope::MessageEnvelope;
use crate::error::Result;

/// Publishes typed events as persistent JSON messages.
#[derive(Clone)]
pub struct EventPublisher {
    client: Arc<dyn BrokerClient>,
}

impl EventPublisher {
    pub fn new(client: Arc<dyn BrokerClient>) -> Self {
        Self { client }
    }

    /// The underlying client.
    pub fn client(&self) -> &Arc<dyn BrokerClient> {
        &self.client
    }

    /// Sends an event to a single queue through the default exchange.
    pub async fn send<E: Event>(&self, queue: &str, event: &E) -> Result<()> {
        self.publish("", queue, event).await
    }

    /// Broadcasts an event to every queue bound to a fanout exchange.
    pub async fn broadcast<E: Event>(&self, exchange: &str, event: &E) -> Result<()> {
        self.publish(exchange, "", event).await
    }

    /// Publishes an event to an exchange with a routing key.
    #[tracing::instrument(skip(self, event), fields(event_type = E::NAME))]
    pub async fn publish<E: Event>(&self, exchange: &str, routing_key: &str, event: &E) -> Result<()> {
        let body = event.encode()?;
        self.client
            .publish(exchange, routing_key, MessageEnvelope::json(body))
            .await?;

        let target = if exchange.is_empty() { routing_key } else { exchange };
        metrics::counter!("broker_messages_published_total", "target" => target.to_string())
            .increment(1);
        tracing::debug!("event published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{BrokerClientExt, ExchangeKind, QueueOptions};
    use crate::memory::InMemoryBroker;
    use common::{OrderId, ProductId};
    use events::{OrderCreated, PaymentFailed};

    #[tokio::test]
    async fn test_send_publishes_persistent_json() {
        let broker = InMemoryBroker::new();
        let client = broker.client(10).unwrap();
        client.declare_queue("order_created_queue", QueueOptions::durable()).await.unwrap();
        let publisher = EventPublisher::new(Arc::new(client));

        let event = OrderCreated::new(OrderId::new(1), ProductId::new(2), 3);
        publisher.send("order_created_queue", &event).await.unwrap();

        let messages = broker.drain("order_created_queue");
        assert_eq!(messages.len(), 1);
        assert!(messages[0].persistent);
        assert_eq!(messages[0].content_type, "application/json");
        assert_eq!(OrderCreated::decode(&messages[0].body).unwrap(), event);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_bound_queue() {
        let broker = InMemoryBroker::new();
        let client = broker.client(10).unwrap();
        client.subscribe_fanout("a", "payment_failed").await.unwrap();
        client.subscribe_fanout("b", "payment_failed").await.unwrap();
        assert_eq!(broker.exchange_kind("payment_failed"), Some(ExchangeKind::Fanout));
        let publisher = EventPublisher::new(Arc::new(client));

        let event = PaymentFailed::new(OrderId::new(1), ProductId::new(1), 2, "declined");
        publisher.broadcast("payment_failed", &event).await.unwrap();

        assert_eq!(broker.queue_depth("a"), 1);
        assert_eq!(broker.queue_depth("b"), 1);
    }

    #[tokio::test]
    async fn test_send_after_disconnect_fails() {
        let broker = InMemoryBroker::new();
        let client = broker.client(10).unwrap();
        client.disconnect().await;
        let publisher = EventPublisher::new(Arc::new(client));

        let event = OrderCreated::new(OrderId::new(1), ProductId::new(2), 3);
        assert!(publisher.send("q", &event).await.is_err());
    }
}
