//! Saga error types.

use broker::BrokerError;
use common::{OrderId, ProductId};
use consumer::HandlerError;
use thiserror::Error;

use crate::state::OrderStatus;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The order cannot move to the requested status.
    #[error("Invalid order status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Quantities must be positive.
    #[error("Quantity must be at least 1, got {0}")]
    InvalidQuantity(i64),

    /// Reserving would push the product's counter past `i64::MAX`.
    #[error("Reserving {quantity} of product {product_id} overflows its reserved count {reserved}")]
    ReservationOverflow {
        product_id: ProductId,
        reserved: i64,
        quantity: i64,
    },

    /// A store read or write failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Releasing a reservation failed; inventory may be inconsistent.
    #[error("Compensation for order {order_id} failed: {reason}")]
    CompensationFailed { order_id: OrderId, reason: String },

    /// Publishing the next saga event failed.
    #[error("Publish failed: {0}")]
    Publish(#[from] BrokerError),
}

impl From<SagaError> for HandlerError {
    fn from(error: SagaError) -> Self {
        match error {
            SagaError::Publish(e) => HandlerError::Publish(e),
            other => HandlerError::other(other),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
