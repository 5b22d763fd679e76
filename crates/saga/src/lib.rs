//! Choreographed order saga.
//!
//! No coordinator drives the saga; each participant reacts to the previous
//! participant's event:
//!
//! ```text
//! Order ──OrderCreated──► Inventory ──StockReserved──► Payment
//!   ▲                        ▲                            │
//!   └──────── PaymentFailed (fanout) ─────────────────────┘
//! ```
//!
//! On `PaymentFailed` the inventory participant releases exactly what it
//! reserved for the order (compensation) and the order participant marks the
//! order failed. The payment step always fails, so `completed` is never
//! reached by the saga.

pub mod error;
pub mod participants;
pub mod state;
pub mod stores;

pub use error::{Result, SagaError};
pub use participants::{
    InventoryParticipant, OrderParticipant, PAYMENT_FAILURE_REASON, PaymentParticipant,
    PaymentSettings, STOCK_RELEASE_REASON,
};
pub use state::OrderStatus;
pub use stores::{
    InMemoryInventoryStore, InMemoryOrderStore, InventoryItem, InventoryStore, Order, OrderStore,
    ReleaseOutcome, Reservation, ReserveOutcome,
};
