//! Payment lifecycle events.

use common::{OrderId, ProductId};
use serde::{Deserialize, Serialize};

use crate::event::Event;
use crate::timestamp::{self, Timestamp};

fn default_currency() -> String {
    "USD".to_string()
}

/// Published by the payment service to start asynchronous processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInitiated {
    pub payment_id: String,
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(with = "timestamp", default = "timestamp::now")]
    pub timestamp: Timestamp,
}

impl PaymentInitiated {
    pub fn new(payment_id: impl Into<String>, amount: f64, currency: impl Into<String>) -> Self {
        Self {
            payment_id: payment_id.into(),
            amount,
            currency: currency.into(),
            timestamp: timestamp::now(),
        }
    }
}

impl Event for PaymentInitiated {
    const NAME: &'static str = "PaymentInitiated";
}

/// Published once a payment has been processed by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCompleted {
    pub payment_id: String,
    pub transaction_id: String,
    /// `"success"` or `"failed"`.
    pub status: String,
    #[serde(with = "timestamp", default = "timestamp::now")]
    pub timestamp: Timestamp,
}

impl PaymentCompleted {
    pub fn success(payment_id: impl Into<String>, transaction_id: impl Into<String>) -> Self {
        Self {
            payment_id: payment_id.into(),
            transaction_id: transaction_id.into(),
            status: "success".to_string(),
            timestamp: timestamp::now(),
        }
    }
}

impl Event for PaymentCompleted {
    const NAME: &'static str = "PaymentCompleted";
}

/// Broadcast when the payment step of the order saga fails.
///
/// Carries the product and quantity of the order so that every participant
/// can compensate without consulting another service's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailed {
    #[serde(default)]
    pub payment_id: Option<String>,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub reason: String,
    #[serde(with = "timestamp", default = "timestamp::now")]
    pub timestamp: Timestamp,
}

impl PaymentFailed {
    pub fn new(
        order_id: OrderId,
        product_id: ProductId,
        quantity: i64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            payment_id: None,
            order_id,
            product_id,
            quantity,
            reason: reason.into(),
            timestamp: timestamp::now(),
        }
    }
}

impl Event for PaymentFailed {
    const NAME: &'static str = "PaymentFailed";
}
