//! Events exchanged by the order saga participants.

use common::{OrderId, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::event::Event;
use crate::timestamp::{self, Timestamp};

fn positive_quantity(quantity: i64) -> Result<(), ValidationError> {
    if quantity >= 1 {
        Ok(())
    } else {
        Err(ValidationError::field(
            "quantity",
            format!("must be at least 1, got {quantity}"),
        ))
    }
}

/// Published by the order service to start the saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i64,
    #[serde(with = "timestamp", default = "timestamp::now")]
    pub timestamp: Timestamp,
}

impl OrderCreated {
    pub fn new(order_id: OrderId, product_id: ProductId, quantity: i64) -> Self {
        Self {
            order_id,
            product_id,
            quantity,
            timestamp: timestamp::now(),
        }
    }
}

impl Event for OrderCreated {
    const NAME: &'static str = "OrderCreated";

    fn validate(&self) -> Result<(), ValidationError> {
        positive_quantity(self.quantity)
    }
}

/// Published by the inventory service after reserving stock for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReserved {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i64,
    #[serde(with = "timestamp", default = "timestamp::now")]
    pub reserved_at: Timestamp,
}

impl StockReserved {
    pub fn new(order_id: OrderId, product_id: ProductId, quantity: i64) -> Self {
        Self {
            order_id,
            product_id,
            quantity,
            reserved_at: timestamp::now(),
        }
    }
}

impl Event for StockReserved {
    const NAME: &'static str = "StockReserved";

    fn validate(&self) -> Result<(), ValidationError> {
        positive_quantity(self.quantity)
    }
}

/// Published by the inventory service when a reservation is compensated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReleased {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i64,
    /// `"payment_failed"` or `"order_cancelled"`.
    pub reason: String,
    #[serde(with = "timestamp", default = "timestamp::now")]
    pub released_at: Timestamp,
}

impl StockReleased {
    pub fn new(
        order_id: OrderId,
        product_id: ProductId,
        quantity: i64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            order_id,
            product_id,
            quantity,
            reason: reason.into(),
            released_at: timestamp::now(),
        }
    }
}

impl Event for StockReleased {
    const NAME: &'static str = "StockReleased";
}
