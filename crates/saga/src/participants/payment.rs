//! Payment participant.
//!
//! Two flows: standalone payments (`PaymentInitiated` → gateway delay →
//! `PaymentCompleted`) and the saga step, which always fails after a short
//! delay so the compensation path runs.

use std::time::Duration;

use async_trait::async_trait;
use broker::EventPublisher;
use common::prefixed_id;
use common::topology::{PAYMENT_COMPLETED_QUEUE, PAYMENT_FAILED_EXCHANGE, PAYMENT_INITIATED_QUEUE};
use consumer::{Handler, HandlerError, ServiceContext};
use events::{PaymentCompleted, PaymentFailed, PaymentInitiated, StockReserved};

use crate::error::Result;

/// Reason broadcast with every saga payment failure.
pub const PAYMENT_FAILURE_REASON: &str = "Insufficient funds (simulated failure for saga demonstration)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentSettings {
    /// Delay before the saga payment step fails.
    pub failure_delay: Duration,
    /// Simulated payment gateway latency.
    pub gateway_delay: Duration,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            failure_delay: Duration::from_millis(500),
            gateway_delay: Duration::from_secs(2),
        }
    }
}

impl PaymentSettings {
    /// No simulated latency.
    pub fn immediate() -> Self {
        Self {
            failure_delay: Duration::ZERO,
            gateway_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PaymentParticipant {
    settings: PaymentSettings,
}

impl PaymentParticipant {
    pub fn new(settings: PaymentSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PaymentSettings {
        &self.settings
    }

    /// Queues a payment for processing and returns its `pay_` id.
    #[tracing::instrument(skip(self, publisher))]
    pub async fn initiate_payment(
        &self,
        publisher: &EventPublisher,
        amount: f64,
        currency: &str,
    ) -> Result<String> {
        let payment_id = prefixed_id("pay");
        publisher
            .send(
                PAYMENT_INITIATED_QUEUE,
                &PaymentInitiated::new(payment_id.clone(), amount, currency),
            )
            .await?;
        tracing::info!(payment_id = %payment_id, "payment initiated");
        Ok(payment_id)
    }

    #[tracing::instrument(skip(self, publisher, event), fields(payment_id = %event.payment_id))]
    pub async fn on_payment_initiated(&self, publisher: &EventPublisher, event: &PaymentInitiated) -> Result<()> {
        tokio::time::sleep(self.settings.gateway_delay).await;

        let completed = PaymentCompleted::success(event.payment_id.clone(), prefixed_id("txn"));
        publisher.send(PAYMENT_COMPLETED_QUEUE, &completed).await?;

        tracing::info!(
            amount = event.amount,
            currency = %event.currency,
            transaction_id = %completed.transaction_id,
            "payment completed"
        );
        metrics::counter!("payments_completed_total").increment(1);
        Ok(())
    }

    /// Saga step: waits, then broadcasts `PaymentFailed` carrying the
    /// reservation details.
    #[tracing::instrument(skip(self, publisher, event), fields(order_id = %event.order_id))]
    pub async fn on_stock_reserved(&self, publisher: &EventPublisher, event: &StockReserved) -> Result<()> {
        tokio::time::sleep(self.settings.failure_delay).await;

        let mut failed = PaymentFailed::new(
            event.order_id,
            event.product_id,
            event.quantity,
            PAYMENT_FAILURE_REASON,
        );
        failed.payment_id = Some(prefixed_id("pay"));
        publisher.broadcast(PAYMENT_FAILED_EXCHANGE, &failed).await?;

        tracing::warn!(reason = PAYMENT_FAILURE_REASON, "payment failed, compensation requested");
        metrics::counter!("saga_payments_failed_total").increment(1);
        Ok(())
    }
}

#[async_trait]
impl Handler<PaymentInitiated> for PaymentParticipant {
    fn name(&self) -> &'static str {
        "payment_initiated"
    }

    async fn handle(&self, event: PaymentInitiated, ctx: &ServiceContext) -> std::result::Result<(), HandlerError> {
        Ok(self.on_payment_initiated(ctx.publisher(), &event).await?)
    }
}

#[async_trait]
impl Handler<StockReserved> for PaymentParticipant {
    fn name(&self) -> &'static str {
        "payment_stock_reserved"
    }

    async fn handle(&self, event: StockReserved, ctx: &ServiceContext) -> std::result::Result<(), HandlerError> {
        Ok(self.on_stock_reserved(ctx.publisher(), &event).await?)
    }
}
