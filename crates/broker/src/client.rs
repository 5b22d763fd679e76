//! The broker client contract and the delivery type handed to consumers.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::envelope::MessageEnvelope;
use crate::error::Result;

/// A stream of deliveries from one queue.
///
/// The stream yields an error (and then ends) when the channel is lost.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery>> + Send>>;

/// Routing behaviour of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    /// Routes to queues bound with a routing key equal to the message's.
    Direct,
    /// Routes a copy to every bound queue, ignoring routing keys.
    Fanout,
    /// Routes by `*`/`#` pattern match on dot-separated routing keys.
    Topic,
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Fanout => "fanout",
            ExchangeKind::Topic => "topic",
        };
        f.write_str(name)
    }
}

/// Options for declaring a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueOptions {
    /// Survives broker restarts.
    pub durable: bool,
    /// Deleted when its last consumer goes away.
    pub auto_delete: bool,
    /// Exchange receiving messages rejected without requeue.
    pub dead_letter_exchange: Option<String>,
}

impl QueueOptions {
    /// Durable, non-auto-delete queue. Used for every service queue.
    pub fn durable() -> Self {
        Self {
            durable: true,
            auto_delete: false,
            dead_letter_exchange: None,
        }
    }

    /// Non-durable queue removed with its last consumer.
    pub fn transient() -> Self {
        Self {
            durable: false,
            auto_delete: true,
            dead_letter_exchange: None,
        }
    }

    /// Sets the dead-letter exchange.
    pub fn with_dead_letter_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.dead_letter_exchange = Some(exchange.into());
        self
    }
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self::durable()
    }
}

/// Result of a queue declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueHandle {
    pub name: String,
    /// Ready messages at declaration time.
    pub message_count: u32,
    pub consumer_count: u32,
}

/// How a delivery is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Processing succeeded; remove the message.
    Ack,
    /// Return the message to its queue unchanged.
    Requeue,
    /// Republish a copy carrying `retry_count` to the tail of the same queue,
    /// then remove the original.
    Retry { retry_count: u32 },
    /// Reject without requeue; the broker dead-letters or discards it.
    DeadLetter,
}

/// Transport-specific settlement of a single delivery.
#[async_trait]
pub trait Acker: Send {
    /// Settles the delivery.
    async fn settle(self: Box<Self>, envelope: MessageEnvelope, settlement: Settlement) -> Result<()>;

    /// Called when a delivery is dropped without being settled. Must not block.
    fn abandon(self: Box<Self>, envelope: MessageEnvelope);
}

/// A message handed to a consumer, which must settle it exactly once.
///
/// Dropping an unsettled delivery returns it to the broker.
pub struct Delivery {
    envelope: MessageEnvelope,
    queue: String,
    delivery_tag: u64,
    redelivered: bool,
    acker: Option<Box<dyn Acker>>,
}

impl Delivery {
    /// Creates a delivery. Called by transports.
    pub fn new(
        envelope: MessageEnvelope,
        queue: impl Into<String>,
        delivery_tag: u64,
        redelivered: bool,
        acker: Box<dyn Acker>,
    ) -> Self {
        Self {
            envelope,
            queue: queue.into(),
            delivery_tag,
            redelivered,
            acker: Some(acker),
        }
    }

    pub fn envelope(&self) -> &MessageEnvelope {
        &self.envelope
    }

    pub fn body(&self) -> &[u8] {
        &self.envelope.body
    }

    /// Name of the queue this delivery came from.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }

    /// Whether the broker delivered this message before.
    pub fn redelivered(&self) -> bool {
        self.redelivered
    }

    pub fn retry_count(&self) -> u32 {
        self.envelope.retry_count
    }

    pub async fn ack(self) -> Result<()> {
        self.settle(Settlement::Ack).await
    }

    pub async fn requeue(self) -> Result<()> {
        self.settle(Settlement::Requeue).await
    }

    pub async fn retry(self, retry_count: u32) -> Result<()> {
        self.settle(Settlement::Retry { retry_count }).await
    }

    pub async fn dead_letter(self) -> Result<()> {
        self.settle(Settlement::DeadLetter).await
    }

    /// Settles the delivery.
    pub async fn settle(mut self, settlement: Settlement) -> Result<()> {
        let envelope = std::mem::take(&mut self.envelope);
        match self.acker.take() {
            Some(acker) => acker.settle(envelope, settlement).await,
            None => Ok(()),
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if let Some(acker) = self.acker.take() {
            tracing::debug!(
                queue = %self.queue,
                delivery_tag = self.delivery_tag,
                "unsettled delivery dropped, returning to broker"
            );
            acker.abandon(std::mem::take(&mut self.envelope));
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("queue", &self.queue)
            .field("delivery_tag", &self.delivery_tag)
            .field("redelivered", &self.redelivered)
            .field("retry_count", &self.envelope.retry_count)
            .field("body_len", &self.envelope.body.len())
            .finish()
    }
}

/// Channel-level operations every service needs from the broker.
///
/// Publishing to the default exchange (`""`) routes directly to the queue
/// named by the routing key.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Declares a queue. Idempotent for identical options.
    async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<QueueHandle>;

    /// Declares an exchange. Idempotent for the same kind.
    async fn declare_exchange(&self, name: &str, kind: ExchangeKind, durable: bool) -> Result<()>;

    /// Binds a queue to an exchange.
    async fn bind(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()>;

    /// Publishes a message.
    async fn publish(&self, exchange: &str, routing_key: &str, message: MessageEnvelope) -> Result<()>;

    /// Starts consuming from a queue. At most `prefetch_count` deliveries
    /// from the returned stream are unsettled at any time.
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream>;

    /// Closes the channel and connection. Idempotent.
    async fn disconnect(&self);

    /// Whether the connection is currently open.
    fn is_connected(&self) -> bool;
}

/// Convenience declarations built on [`BrokerClient`].
#[async_trait]
pub trait BrokerClientExt: BrokerClient {
    /// Declares a durable queue.
    async fn declare_durable_queue(&self, name: &str) -> Result<QueueHandle> {
        self.declare_queue(name, QueueOptions::durable()).await
    }

    /// Declares a durable fanout exchange.
    async fn declare_fanout(&self, exchange: &str) -> Result<()> {
        self.declare_exchange(exchange, ExchangeKind::Fanout, true).await
    }

    /// Declares a durable queue and binds it to a fanout exchange.
    async fn subscribe_fanout(&self, queue: &str, exchange: &str) -> Result<QueueHandle> {
        self.declare_fanout(exchange).await?;
        let handle = self.declare_durable_queue(queue).await?;
        self.bind(queue, exchange, "").await?;
        Ok(handle)
    }
}

impl<T: BrokerClient + ?Sized> BrokerClientExt for T {}
