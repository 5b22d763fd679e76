//! The run loop shared by point-to-point and fanout consumers.

use std::any::Any;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use broker::{BrokerClientExt, Delivery, Settlement};
use events::Event;
use futures_util::{FutureExt, StreamExt};
use tokio::task::JoinSet;

use crate::context::ServiceContext;
use crate::error::{ConsumerError, HandlerError, Result};
use crate::handler::Handler;
use crate::retry::RetryDecision;

/// Characters of the body included in dead-letter logs.
const DEAD_LETTER_PREVIEW_CHARS: usize = 100;

/// Consumes one queue with one handler.
///
/// Deliveries are processed concurrently, bounded by the client's prefetch
/// count. The loop ends when the shutdown signal fires (returning `Ok`) or
/// the delivery stream fails (returning [`ConsumerError::ConnectionLost`]).
pub struct Consumer<E, H> {
    ctx: ServiceContext,
    queue: String,
    handler: Arc<H>,
    _event: PhantomData<fn() -> E>,
}

impl<E, H> Consumer<E, H>
where
    E: Event,
    H: Handler<E> + 'static,
{
    pub fn new(ctx: ServiceContext, queue: impl Into<String>, handler: H) -> Self {
        Self::with_shared_handler(ctx, queue, Arc::new(handler))
    }

    /// Creates a consumer around a handler that is also used elsewhere.
    pub fn with_shared_handler(ctx: ServiceContext, queue: impl Into<String>, handler: Arc<H>) -> Self {
        Self {
            ctx,
            queue: queue.into(),
            handler,
            _event: PhantomData,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn ctx(&self) -> &ServiceContext {
        &self.ctx
    }

    /// Declares the queue as durable and runs until shutdown or connection loss.
    pub async fn run(self) -> Result<()> {
        self.ctx.client().declare_durable_queue(&self.queue).await?;
        self.consume().await
    }

    /// Runs the loop against an already declared queue.
    #[tracing::instrument(skip(self), fields(queue = %self.queue, handler = self.handler.name()))]
    pub(crate) async fn consume(self) -> Result<()> {
        let consumer_tag = format!("{}.{}", self.ctx.service(), self.handler.name());
        let mut deliveries = self
            .ctx
            .client()
            .consume(&self.queue, &consumer_tag)
            .await?;
        let shutdown = self.ctx.shutdown().clone();
        let mut in_flight = JoinSet::new();

        tracing::info!(event_type = E::NAME, "consumer started");

        let outcome = loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    tracing::info!(in_flight = in_flight.len(), "shutdown requested, no longer accepting deliveries");
                    break Ok(());
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    log_join_error(joined);
                }
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => {
                        in_flight.spawn(process::<E, H>(
                            delivery,
                            Arc::clone(&self.handler),
                            self.ctx.clone(),
                        ));
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "delivery stream failed");
                        break Err(ConsumerError::ConnectionLost {
                            queue: self.queue.clone(),
                            source: Some(e),
                        });
                    }
                    None => {
                        tracing::error!("delivery stream ended");
                        break Err(ConsumerError::ConnectionLost {
                            queue: self.queue.clone(),
                            source: None,
                        });
                    }
                },
            }
        };
        drop(deliveries);

        if outcome.is_err() {
            // Nothing can be settled on a dead channel.
            in_flight.abort_all();
        }
        while let Some(joined) = in_flight.join_next().await {
            log_join_error(joined);
        }

        tracing::info!("consumer stopped");
        outcome
    }
}

fn log_join_error(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined
        && !e.is_cancelled()
    {
        tracing::error!(error = %e, "message task failed");
    }
}

async fn process<E, H>(delivery: Delivery, handler: Arc<H>, ctx: ServiceContext)
where
    E: Event,
    H: Handler<E>,
{
    let queue = delivery.queue().to_string();
    let retry_count = delivery.retry_count();
    let shutdown = ctx.shutdown().clone();
    let grace = ctx.settings().shutdown_grace;
    let started = Instant::now();

    let (result, cancelled) = {
        let work = run_handler::<E, H>(handler.as_ref(), delivery.body(), &ctx);
        tokio::pin!(work);
        tokio::select! {
            result = &mut work => (Some(result), false),
            () = shutdown.cancelled() => (tokio::time::timeout(grace, &mut work).await.ok(), true),
        }
    };

    metrics::histogram!("consumer_handler_duration_seconds", "queue" => queue.clone())
        .record(started.elapsed().as_secs_f64());

    let settlement = match result {
        Some(Ok(())) => {
            tracing::debug!(queue = %queue, retry_count, "message handled");
            metrics::counter!("consumer_messages_acked_total", "queue" => queue.clone()).increment(1);
            Settlement::Ack
        }
        Some(Err(e)) if !cancelled => failure_settlement(&ctx, &delivery, &e),
        Some(Err(_)) | None => {
            tracing::warn!(
                queue = %queue,
                grace_ms = grace.as_millis() as u64,
                "handler interrupted by shutdown, requeueing message"
            );
            metrics::counter!("consumer_messages_requeued_total", "queue" => queue.clone()).increment(1);
            Settlement::Requeue
        }
    };

    if let Err(e) = delivery.settle(settlement).await {
        tracing::warn!(queue = %queue, ?settlement, error = %e, "failed to settle delivery");
    }
}

async fn run_handler<E, H>(handler: &H, body: &[u8], ctx: &ServiceContext) -> std::result::Result<(), HandlerError>
where
    E: Event,
    H: Handler<E>,
{
    let event = E::decode(body)?;
    AssertUnwindSafe(handler.handle(event, ctx))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(panic.as_ref()))))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn failure_settlement(ctx: &ServiceContext, delivery: &Delivery, error: &HandlerError) -> Settlement {
    let queue = delivery.queue();
    let retry_count = delivery.retry_count();
    let policy = ctx.settings().retry;

    let decision = policy.decide(retry_count);
    match decision {
        RetryDecision::Retry { retry_count: next } => {
            if error.is_malformed_message() {
                tracing::error!(queue, retry_count = next, max_retries = policy.max_retries, error = %error, "malformed message, scheduling retry");
            } else {
                tracing::warn!(queue, retry_count = next, max_retries = policy.max_retries, error = %error, "handler failed, scheduling retry");
            }
            metrics::counter!("consumer_messages_retried_total", "queue" => queue.to_string()).increment(1);
        }
        RetryDecision::DeadLetter => {
            tracing::error!(
                queue,
                retry_count,
                error = %error,
                body = %delivery.envelope().body_preview(DEAD_LETTER_PREVIEW_CHARS),
                "message dead-lettered after exhausting retries"
            );
            metrics::counter!("consumer_messages_dead_lettered_total", "queue" => queue.to_string()).increment(1);
        }
    }
    decision.into()
}
