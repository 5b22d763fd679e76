//! Product catalogue events.

use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::event::Event;
use crate::timestamp::{self, Timestamp};

/// Broadcast on the product updates fanout exchange whenever a product
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdated {
    pub product_id: ProductId,
    pub name: String,
    pub stock: i64,
    #[serde(with = "timestamp", default = "timestamp::now")]
    pub timestamp: Timestamp,
}

impl ProductUpdated {
    pub fn new(product_id: ProductId, name: impl Into<String>, stock: i64) -> Self {
        Self {
            product_id,
            name: name.into(),
            stock,
            timestamp: timestamp::now(),
        }
    }
}

impl Event for ProductUpdated {
    const NAME: &'static str = "ProductUpdated";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let event = ProductUpdated::new(ProductId::new(3), "Widget", 10);
        let value: serde_json::Value = serde_json::from_slice(&event.encode().unwrap()).unwrap();
        assert_eq!(value["product_id"], 3);
        assert_eq!(value["name"], "Widget");
        assert_eq!(value["stock"], 10);
        assert!(value["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_rejects_fractional_stock() {
        let body = br#"{"product_id": 3, "name": "Widget", "stock": 1.5}"#;
        let err = ProductUpdated::decode(body).unwrap_err();
        assert_eq!(err.field, "stock");
    }
}
