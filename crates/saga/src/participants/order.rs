//! Order participant: starts the saga and records its outcome.

use std::sync::Arc;

use async_trait::async_trait;
use broker::EventPublisher;
use common::topology::ORDER_CREATED_QUEUE;
use common::{OrderId, ProductId};
use consumer::{Handler, HandlerError, ServiceContext};
use events::{OrderCreated, PaymentFailed};

use crate::error::Result;
use crate::state::OrderStatus;
use crate::stores::{Order, OrderStore};

#[derive(Clone)]
pub struct OrderParticipant {
    store: Arc<dyn OrderStore>,
}

impl OrderParticipant {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    /// Creates a pending order and publishes `OrderCreated`.
    ///
    /// The order stays pending if publishing fails; the error is returned.
    #[tracing::instrument(skip(self, publisher))]
    pub async fn create_order(
        &self,
        publisher: &EventPublisher,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<Order> {
        let order = self.store.create(product_id, quantity).await?;
        publisher
            .send(
                ORDER_CREATED_QUEUE,
                &OrderCreated::new(order.id, order.product_id, order.quantity),
            )
            .await?;

        tracing::info!(order_id = %order.id, "order created, saga started");
        metrics::counter!("saga_orders_created_total").increment(1);
        Ok(order)
    }

    pub async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        self.store.get(id).await
    }

    /// Marks the order failed. A missing order is logged and ignored.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id))]
    pub async fn on_payment_failed(&self, event: &PaymentFailed) -> Result<()> {
        if self.store.get(event.order_id).await?.is_none() {
            tracing::error!(reason = %event.reason, "payment failed for unknown order");
            return Ok(());
        }

        let previous = self
            .store
            .set_status(event.order_id, OrderStatus::Failed)
            .await?;
        if previous == OrderStatus::Failed {
            tracing::debug!("order already failed");
        } else {
            tracing::info!(reason = %event.reason, "order failed");
            metrics::counter!("saga_orders_failed_total").increment(1);
        }
        Ok(())
    }
}

#[async_trait]
impl Handler<PaymentFailed> for OrderParticipant {
    fn name(&self) -> &'static str {
        "order_payment_failed"
    }

    async fn handle(&self, event: PaymentFailed, _ctx: &ServiceContext) -> std::result::Result<(), HandlerError> {
        Ok(self.on_payment_failed(&event).await?)
    }
}
