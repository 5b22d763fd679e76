//! Inventory participant: reserves stock and compensates on payment failure.

use std::sync::Arc;

use async_trait::async_trait;
use broker::EventPublisher;
use common::topology::{STOCK_RELEASED_QUEUE, STOCK_RESERVED_QUEUE};
use common::ProductId;
use consumer::{Handler, HandlerError, ServiceContext};
use events::{OrderCreated, PaymentFailed, StockReleased, StockReserved};

use crate::error::{Result, SagaError};
use crate::stores::{InventoryItem, InventoryStore, ReleaseOutcome, ReserveOutcome};

/// `reason` carried by `StockReleased` when compensating a failed payment.
pub const STOCK_RELEASE_REASON: &str = "payment_failed";

#[derive(Clone)]
pub struct InventoryParticipant {
    store: Arc<dyn InventoryStore>,
}

impl InventoryParticipant {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    /// Reserved stock for a product; a zero row when nothing was reserved.
    pub async fn get_inventory(&self, product_id: ProductId) -> Result<InventoryItem> {
        Ok(self
            .store
            .get(product_id)
            .await?
            .unwrap_or_else(|| InventoryItem::empty(product_id)))
    }

    /// Reserves stock for the order and publishes `StockReserved`.
    ///
    /// A redelivered event republishes without reserving again.
    #[tracing::instrument(skip(self, publisher, event), fields(order_id = %event.order_id, product_id = %event.product_id))]
    pub async fn on_order_created(&self, publisher: &EventPublisher, event: &OrderCreated) -> Result<()> {
        let reservation = match self
            .store
            .reserve(event.order_id, event.product_id, event.quantity)
            .await?
        {
            ReserveOutcome::Reserved(item) => {
                tracing::info!(quantity = event.quantity, reserved = item.reserved, "stock reserved");
                metrics::counter!("saga_stock_reserved_total").increment(1);
                StockReserved::new(event.order_id, event.product_id, event.quantity)
            }
            ReserveOutcome::AlreadyReserved(existing) => {
                tracing::info!(quantity = existing.quantity, "order already reserved, republishing");
                StockReserved::new(existing.order_id, existing.product_id, existing.quantity)
            }
        };

        publisher.send(STOCK_RESERVED_QUEUE, &reservation).await?;
        Ok(())
    }

    /// Compensates a failed payment by releasing exactly what the order
    /// reserved, then publishes `StockReleased`.
    #[tracing::instrument(skip(self, publisher, event), fields(order_id = %event.order_id))]
    pub async fn on_payment_failed(&self, publisher: &EventPublisher, event: &PaymentFailed) -> Result<()> {
        let outcome = self.store.release(event.order_id).await.map_err(|e| {
            tracing::error!(
                error = %e,
                consistency_risk = true,
                product_id = %event.product_id,
                quantity = event.quantity,
                "compensation failed, reserved stock may be inconsistent"
            );
            SagaError::CompensationFailed {
                order_id: event.order_id,
                reason: e.to_string(),
            }
        })?;

        let reservation = match outcome {
            ReleaseOutcome::Released { reservation, item } => {
                tracing::info!(
                    quantity = reservation.quantity,
                    reserved = item.reserved,
                    reason = %event.reason,
                    "stock released"
                );
                metrics::counter!("saga_compensations_total").increment(1);
                reservation
            }
            ReleaseOutcome::AlreadyReleased(reservation) => {
                tracing::info!("reservation already released, republishing");
                reservation
            }
            ReleaseOutcome::NotReserved => {
                tracing::warn!(
                    product_id = %event.product_id,
                    quantity = event.quantity,
                    "no reservation for order, nothing to compensate"
                );
                return Ok(());
            }
        };

        if reservation.product_id != event.product_id || reservation.quantity != event.quantity {
            tracing::warn!(
                reserved_product_id = %reservation.product_id,
                reserved_quantity = reservation.quantity,
                event_product_id = %event.product_id,
                event_quantity = event.quantity,
                "payment failure disagrees with reservation ledger, releasing ledger amount"
            );
        }

        let released = StockReleased::new(
            reservation.order_id,
            reservation.product_id,
            reservation.quantity,
            STOCK_RELEASE_REASON,
        );
        publisher.send(STOCK_RELEASED_QUEUE, &released).await?;
        Ok(())
    }
}

#[async_trait]
impl Handler<OrderCreated> for InventoryParticipant {
    fn name(&self) -> &'static str {
        "inventory_order_created"
    }

    async fn handle(&self, event: OrderCreated, ctx: &ServiceContext) -> std::result::Result<(), HandlerError> {
        Ok(self.on_order_created(ctx.publisher(), &event).await?)
    }
}

#[async_trait]
impl Handler<PaymentFailed> for InventoryParticipant {
    fn name(&self) -> &'static str {
        "inventory_payment_failed"
    }

    async fn handle(&self, event: PaymentFailed, ctx: &ServiceContext) -> std::result::Result<(), HandlerError> {
        Ok(self.on_payment_failed(ctx.publisher(), &event).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::InMemoryInventoryStore;
    use broker::{BrokerClientExt, InMemoryBroker};
    use common::OrderId;
    use events::Event;

    struct Fixture {
        participant: InventoryParticipant,
        store: InMemoryInventoryStore,
        publisher: EventPublisher,
        broker: InMemoryBroker,
    }

    async fn fixture() -> Fixture {
        let broker = InMemoryBroker::new();
        let client = broker.client(10).unwrap();
        client.declare_durable_queue(STOCK_RESERVED_QUEUE).await.unwrap();
        client.declare_durable_queue(STOCK_RELEASED_QUEUE).await.unwrap();
        let store = InMemoryInventoryStore::new();
        Fixture {
            participant: InventoryParticipant::new(Arc::new(store.clone())),
            store,
            publisher: EventPublisher::new(Arc::new(client)),
            broker,
        }
    }

    fn created(quantity: i64) -> OrderCreated {
        OrderCreated::new(OrderId::new(1), ProductId::new(1), quantity)
    }

    fn failed(quantity: i64) -> PaymentFailed {
        PaymentFailed::new(OrderId::new(1), ProductId::new(1), quantity, "Insufficient funds")
    }

    #[tokio::test]
    async fn test_order_created_reserves_and_publishes() {
        let f = fixture().await;
        f.participant.on_order_created(&f.publisher, &created(5)).await.unwrap();

        assert_eq!(f.store.reserved(ProductId::new(1)), 5);
        let published = f.broker.drain(STOCK_RESERVED_QUEUE);
        assert_eq!(published.len(), 1);
        let event = StockReserved::decode(&published[0].body).unwrap();
        assert_eq!(
            (event.order_id, event.product_id, event.quantity),
            (OrderId::new(1), ProductId::new(1), 5)
        );
    }

    #[tokio::test]
    async fn test_duplicate_order_created_republishes_without_reserving() {
        let f = fixture().await;
        f.participant.on_order_created(&f.publisher, &created(5)).await.unwrap();
        f.participant.on_order_created(&f.publisher, &created(5)).await.unwrap();

        assert_eq!(f.store.reserved(ProductId::new(1)), 5);
        assert_eq!(f.broker.queue_depth(STOCK_RESERVED_QUEUE), 2);
    }

    #[tokio::test]
    async fn test_payment_failed_releases_reservation() {
        let f = fixture().await;
        f.participant.on_order_created(&f.publisher, &created(5)).await.unwrap();
        f.participant.on_payment_failed(&f.publisher, &failed(5)).await.unwrap();

        assert_eq!(f.store.reserved(ProductId::new(1)), 0);
        let published = f.broker.drain(STOCK_RELEASED_QUEUE);
        assert_eq!(published.len(), 1);
        let event = StockReleased::decode(&published[0].body).unwrap();
        assert_eq!(event.quantity, 5);
        assert_eq!(event.reason, STOCK_RELEASE_REASON);
    }

    #[tokio::test]
    async fn test_compensation_uses_ledger_quantity() {
        let f = fixture().await;
        f.participant.on_order_created(&f.publisher, &created(5)).await.unwrap();
        f.participant.on_payment_failed(&f.publisher, &failed(9)).await.unwrap();

        assert_eq!(f.store.reserved(ProductId::new(1)), 0);
        let published = f.broker.drain(STOCK_RELEASED_QUEUE);
        assert_eq!(StockReleased::decode(&published[0].body).unwrap().quantity, 5);
    }

    #[tokio::test]
    async fn test_duplicate_payment_failed_releases_once() {
        let f = fixture().await;
        f.participant.on_order_created(&f.publisher, &created(3)).await.unwrap();
        f.participant
            .on_order_created(&f.publisher, &OrderCreated::new(OrderId::new(2), ProductId::new(1), 4))
            .await
            .unwrap();

        f.participant.on_payment_failed(&f.publisher, &failed(3)).await.unwrap();
        f.participant.on_payment_failed(&f.publisher, &failed(3)).await.unwrap();

        assert_eq!(f.store.reserved(ProductId::new(1)), 4);
    }

    #[tokio::test]
    async fn test_payment_failed_without_reservation_is_noop() {
        let f = fixture().await;
        f.participant.on_payment_failed(&f.publisher, &failed(5)).await.unwrap();

        assert_eq!(f.store.reserved(ProductId::new(1)), 0);
        assert_eq!(f.broker.queue_depth(STOCK_RELEASED_QUEUE), 0);
    }

    #[tokio::test]
    async fn test_store_failure_during_compensation_is_surfaced() {
        let f = fixture().await;
        f.participant.on_order_created(&f.publisher, &created(5)).await.unwrap();
        f.store.set_fail_writes(true);

        let result = f.participant.on_payment_failed(&f.publisher, &failed(5)).await;
        assert!(matches!(result, Err(SagaError::CompensationFailed { .. })));
        assert_eq!(f.store.reserved(ProductId::new(1)), 5);
    }

    #[tokio::test]
    async fn test_get_inventory_defaults_to_zero() {
        let f = fixture().await;
        let item = f.participant.get_inventory(ProductId::new(7)).await.unwrap();
        assert_eq!(item, InventoryItem::empty(ProductId::new(7)));
    }
}
