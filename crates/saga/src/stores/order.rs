//! Order store trait and in-memory implementation.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::{OrderId, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::SagaError;
use crate::state::OrderStatus;

/// An order row owned by the order participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub status: OrderStatus,
}

/// Persistence for orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a pending order and assigns its id.
    async fn create(&self, product_id: ProductId, quantity: i64) -> Result<Order, SagaError>;

    async fn get(&self, id: OrderId) -> Result<Option<Order>, SagaError>;

    /// Moves an order to `status`, validating the transition.
    ///
    /// Returns the previous status.
    async fn set_status(&self, id: OrderId, status: OrderStatus) -> Result<OrderStatus, SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryOrderState {
    orders: BTreeMap<OrderId, Order>,
    next_id: i64,
    fail_writes: bool,
}

/// In-memory order store with sequential ids starting at 1.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<InMemoryOrderState>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_writes = fail;
    }

    pub fn order_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .orders
            .len()
    }

    /// Snapshot of all orders in id order.
    pub fn orders(&self) -> Vec<Order> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .orders
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, product_id: ProductId, quantity: i64) -> Result<Order, SagaError> {
        if quantity < 1 {
            return Err(SagaError::InvalidQuantity(quantity));
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.fail_writes {
            return Err(SagaError::Store("order store unavailable".to_string()));
        }

        state.next_id += 1;
        let order = Order {
            id: OrderId::new(state.next_id),
            product_id,
            quantity,
            status: OrderStatus::Pending,
        };
        state.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, SagaError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.orders.get(&id).cloned())
    }

    async fn set_status(&self, id: OrderId, status: OrderStatus) -> Result<OrderStatus, SagaError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.fail_writes {
            return Err(SagaError::Store("order store unavailable".to_string()));
        }

        let order = state
            .orders
            .get_mut(&id)
            .ok_or(SagaError::OrderNotFound(id))?;
        let previous = order.status;
        order.status = previous.transition(status)?;
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let store = InMemoryOrderStore::new();
        let first = store.create(ProductId::new(1), 5).await.unwrap();
        let second = store.create(ProductId::new(2), 1).await.unwrap();

        assert_eq!(first.id, OrderId::new(1));
        assert_eq!(second.id, OrderId::new(2));
        assert_eq!(first.status, OrderStatus::Pending);
        assert_eq!(store.order_count(), 2);
    }

    #[tokio::test]
    async fn test_create_rejects_non_positive_quantity() {
        let store = InMemoryOrderStore::new();
        let result = store.create(ProductId::new(1), 0).await;
        assert!(matches!(result, Err(SagaError::InvalidQuantity(0))));
        assert_eq!(store.order_count(), 0);
    }

    #[tokio::test]
    async fn test_set_status_returns_previous() {
        let store = InMemoryOrderStore::new();
        let order = store.create(ProductId::new(1), 1).await.unwrap();

        let previous = store.set_status(order.id, OrderStatus::Failed).await.unwrap();
        assert_eq!(previous, OrderStatus::Pending);

        let again = store.set_status(order.id, OrderStatus::Failed).await.unwrap();
        assert_eq!(again, OrderStatus::Failed);
        assert_eq!(
            store.get(order.id).await.unwrap().unwrap().status,
            OrderStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_set_status_on_missing_order() {
        let store = InMemoryOrderStore::new();
        let result = store.set_status(OrderId::new(9), OrderStatus::Failed).await;
        assert!(matches!(result, Err(SagaError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let store = InMemoryOrderStore::new();
        store.set_fail_writes(true);
        assert!(matches!(
            store.create(ProductId::new(1), 1).await,
            Err(SagaError::Store(_))
        ));
    }
}
