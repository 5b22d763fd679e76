//! Integration tests for the event catalog wire format.

use chrono::{TimeZone, Utc};
use common::{OrderId, ProductId, UserId};
use events::{
    AnalyticsProcessed, AnyEvent, ClickTracked, Event, GenerateReportJob, OrderCreated,
    PaymentCompleted, PaymentFailed, PaymentInitiated, ProductUpdated, ReportGenerated,
    StockReleased, StockReserved, UserRegistered, timestamp,
};

fn assert_roundtrip<E: Event + PartialEq + std::fmt::Debug>(event: E) {
    let bytes = event.encode().unwrap();
    let decoded = E::decode(&bytes).unwrap();
    assert_eq!(decoded, event, "{} did not round-trip", E::NAME);
}

#[test]
fn test_every_event_roundtrips() {
    assert_roundtrip(UserRegistered::new(UserId::new(1), "a@example.com"));
    assert_roundtrip(PaymentInitiated::new("pay_1", 99.95, "EUR"));
    assert_roundtrip(PaymentCompleted::success("pay_1", "txn_0123456789ab"));
    assert_roundtrip(PaymentFailed::new(
        OrderId::new(1),
        ProductId::new(1),
        5,
        "Insufficient funds",
    ));
    assert_roundtrip(ProductUpdated::new(ProductId::new(2), "Gadget", 0));
    assert_roundtrip(GenerateReportJob::new("job_1", "sales"));
    assert_roundtrip(ReportGenerated::new("job_1", "ab".repeat(32), 10.25));
    assert_roundtrip(OrderCreated::new(OrderId::new(1), ProductId::new(1), 5));
    assert_roundtrip(StockReserved::new(OrderId::new(1), ProductId::new(1), 5));
    assert_roundtrip(StockReleased::new(
        OrderId::new(1),
        ProductId::new(1),
        5,
        "payment_failed",
    ));
    assert_roundtrip(ClickTracked::new(
        UserId::new(9),
        "/checkout",
        Some("sess-1".to_string()),
    ));
    assert_roundtrip(AnalyticsProcessed::new("batch_1", 1000));
}

#[test]
fn test_roundtrip_preserves_microseconds() {
    let mut event = OrderCreated::new(OrderId::new(1), ProductId::new(1), 1);
    event.timestamp = Utc
        .with_ymd_and_hms(2025, 6, 1, 8, 30, 0)
        .unwrap()
        .checked_add_signed(chrono::Duration::microseconds(123_456))
        .unwrap();
    assert_roundtrip(event);
}

#[test]
fn test_timestamps_are_sortable_text() {
    let event = OrderCreated::new(OrderId::new(1), ProductId::new(1), 1);
    let value: serde_json::Value = serde_json::from_slice(&event.encode().unwrap()).unwrap();
    let text = value["timestamp"].as_str().unwrap();
    assert_eq!(text.len(), "2025-01-01T12:00:00.000000Z".len());
    assert_eq!(timestamp::parse(text).unwrap(), event.timestamp);
}

#[test]
fn test_missing_fields_are_named() {
    let cases: Vec<(&str, &[u8], &str)> = vec![
        ("OrderCreated", br#"{"product_id": 1, "quantity": 1}"#, "order_id"),
        ("StockReserved", br#"{"order_id": 1, "quantity": 1}"#, "product_id"),
        ("PaymentInitiated", br#"{"amount": 1.0}"#, "payment_id"),
        ("ProductUpdated", br#"{"product_id": 1, "stock": 1}"#, "name"),
        ("ClickTracked", br#"{"user_id": 1}"#, "page"),
    ];

    for (name, body, field) in cases {
        let err = AnyEvent::decode_named(name, body).unwrap_err();
        assert_eq!(err.field, field, "{name}");
    }
}

#[test]
fn test_type_mismatches_are_not_coerced() {
    let cases: Vec<(&str, &[u8], &str)> = vec![
        (
            "OrderCreated",
            br#"{"order_id": 1, "product_id": "1", "quantity": 1}"#,
            "product_id",
        ),
        (
            "UserRegistered",
            br#"{"user_id": 1.5, "email": "a@b.io"}"#,
            "user_id",
        ),
        (
            "PaymentCompleted",
            br#"{"payment_id": 1, "transaction_id": "t", "status": "success"}"#,
            "payment_id",
        ),
        (
            "StockReleased",
            br#"{"order_id": 1, "product_id": 1, "quantity": 1, "reason": "x", "released_at": 17}"#,
            "released_at",
        ),
    ];

    for (name, body, field) in cases {
        let err = AnyEvent::decode_named(name, body).unwrap_err();
        assert_eq!(err.field, field, "{name}");
    }
}

#[test]
fn test_malformed_bodies_fail_for_every_type() {
    for name in AnyEvent::NAMES {
        assert!(AnyEvent::decode_named(name, b"not json").is_err(), "{name}");
        assert!(AnyEvent::decode_named(name, b"[]").is_err(), "{name}");
        assert!(AnyEvent::decode_named(name, b"").is_err(), "{name}");
    }
}

#[test]
fn test_unknown_fields_are_ignored() {
    let body = br#"{"order_id": 1, "product_id": 1, "quantity": 1, "extra": true}"#;
    assert!(OrderCreated::decode(body).is_ok());
}
