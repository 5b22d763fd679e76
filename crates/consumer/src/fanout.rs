use broker::BrokerClientExt;
use common::topology::fanout_queue_name;
use events::Event;

use crate::consumer::Consumer;
use crate::context::ServiceContext;
use crate::error::{ConsumerError, Result};
use crate::handler::Handler;

/// A consumer with its own durable queue bound to a fanout exchange.
///
/// Every service subscribing to the same exchange gets a copy of each
/// message. The queue is named `{service}_{exchange}_queue` unless given
/// explicitly.
pub struct FanoutConsumer<E, H> {
    exchange: String,
    inner: Consumer<E, H>,
}

impl<E, H> FanoutConsumer<E, H>
where
    E: Event,
    H: Handler<E> + 'static,
{
    /// Creates a consumer whose queue is derived from the service name.
    pub fn new(ctx: ServiceContext, exchange: &str, handler: H) -> Result<Self> {
        let queue = fanout_queue_name(ctx.service(), exchange);
        Self::with_queue(ctx, exchange, queue, handler)
    }

    /// Creates a consumer with an explicit queue name.
    ///
    /// The queue must be non-empty and differ from the exchange name.
    pub fn with_queue(
        ctx: ServiceContext,
        exchange: &str,
        queue: impl Into<String>,
        handler: H,
    ) -> Result<Self> {
        let queue = queue.into();
        if exchange.is_empty() {
            return Err(ConsumerError::InvalidQueue(
                "fanout exchange name must not be empty".to_string(),
            ));
        }
        if queue.is_empty() {
            return Err(ConsumerError::InvalidQueue(format!(
                "queue for exchange {exchange:?} must not be empty"
            )));
        }
        if queue == exchange {
            return Err(ConsumerError::InvalidQueue(format!(
                "queue name {queue:?} must differ from its exchange"
            )));
        }

        Ok(Self {
            exchange: exchange.to_string(),
            inner: Consumer::new(ctx, queue, handler),
        })
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn queue(&self) -> &str {
        self.inner.queue()
    }

    /// Declares the exchange and queue, binds them, then consumes until
    /// shutdown or connection loss.
    pub async fn run(self) -> Result<()> {
        let queue = self.inner.queue().to_string();
        self.inner
            .ctx()
            .client()
            .subscribe_fanout(&queue, &self.exchange)
            .await?;
        tracing::info!(exchange = %self.exchange, queue = %queue, "bound to fanout exchange");
        self.inner.consume().await
    }
}
