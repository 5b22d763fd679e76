//! Inventory store trait and in-memory implementation.
//!
//! The store keeps a reserved counter per product plus a ledger of what each
//! order reserved, so redelivered events neither double-reserve nor
//! double-release.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::{OrderId, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::SagaError;

/// Reserved stock for one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub product_id: ProductId,
    pub reserved: i64,
}

impl InventoryItem {
    /// Row reported for a product nothing has been reserved for.
    pub fn empty(product_id: ProductId) -> Self {
        Self {
            product_id,
            reserved: 0,
        }
    }
}

/// What an order reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub released: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// The counter was incremented.
    Reserved(InventoryItem),
    /// The order had already reserved; nothing changed.
    AlreadyReserved(Reservation),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The counter was decremented by the order's reserved quantity.
    Released {
        reservation: Reservation,
        item: InventoryItem,
    },
    /// The reservation had already been released; nothing changed.
    AlreadyReleased(Reservation),
    /// The order never reserved anything.
    NotReserved,
}

/// Persistence for reserved stock.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Reserves `quantity` of `product_id` for `order_id`, creating the row
    /// if absent. Idempotent per order.
    async fn reserve(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<ReserveOutcome, SagaError>;

    /// Releases what `order_id` reserved. The counter never goes below zero.
    async fn release(&self, order_id: OrderId) -> Result<ReleaseOutcome, SagaError>;

    async fn get(&self, product_id: ProductId) -> Result<Option<InventoryItem>, SagaError>;

    async fn reservation(&self, order_id: OrderId) -> Result<Option<Reservation>, SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    items: HashMap<ProductId, InventoryItem>,
    ledger: HashMap<OrderId, Reservation>,
    fail_writes: bool,
}

/// In-memory inventory store for tests and the in-process runtime.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryStore {
    state: Arc<RwLock<InMemoryInventoryState>>,
}

impl InMemoryInventoryStore {
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

    /// Reserved count for a product, 0 when it has no row.
    pub fn reserved(&self, product_id: ProductId) -> i64 {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .get(&product_id)
            .map_or(0, |item| item.reserved)
    }

    /// Overwrites a product's counter. Used to model drift between the
    /// ledger and the counter.
    pub fn set_reserved(&self, product_id: ProductId, reserved: i64) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .insert(product_id, InventoryItem { product_id, reserved });
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn reserve(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<ReserveOutcome, SagaError> {
        if quantity < 1 {
            return Err(SagaError::InvalidQuantity(quantity));
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.fail_writes {
            return Err(SagaError::Store("inventory store unavailable".to_string()));
        }

        if let Some(existing) = state.ledger.get(&order_id) {
            return Ok(ReserveOutcome::AlreadyReserved(*existing));
        }

        let current = state
            .items
            .get(&product_id)
            .copied()
            .unwrap_or_else(|| InventoryItem::empty(product_id));
        let Some(reserved) = current.reserved.checked_add(quantity) else {
            return Err(SagaError::ReservationOverflow {
                product_id,
                reserved: current.reserved,
                quantity,
            });
        };
        let item = InventoryItem { product_id, reserved };
        state.items.insert(product_id, item);

        state.ledger.insert(
            order_id,
            Reservation {
                order_id,
                product_id,
                quantity,
                released: false,
            },
        );
        Ok(ReserveOutcome::Reserved(item))
    }

    async fn release(&self, order_id: OrderId) -> Result<ReleaseOutcome, SagaError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.fail_writes {
            return Err(SagaError::Store("inventory store unavailable".to_string()));
        }

        let Some(reservation) = state.ledger.get_mut(&order_id) else {
            return Ok(ReleaseOutcome::NotReserved);
        };
        if reservation.released {
            return Ok(ReleaseOutcome::AlreadyReleased(*reservation));
        }
        reservation.released = true;
        let reservation = *reservation;

        let item = state
            .items
            .entry(reservation.product_id)
            .or_insert_with(|| InventoryItem::empty(reservation.product_id));
        item.reserved = (item.reserved - reservation.quantity).max(0);

        Ok(ReleaseOutcome::Released {
            reservation,
            item: *item,
        })
    }

    async fn get(&self, product_id: ProductId) -> Result<Option<InventoryItem>, SagaError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.items.get(&product_id).copied())
    }

    async fn reservation(&self, order_id: OrderId) -> Result<Option<Reservation>, SagaError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.ledger.get(&order_id).copied())
    }
}
