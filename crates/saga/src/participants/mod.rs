//! The three saga participants.

pub mod inventory;
pub mod order;
pub mod payment;

pub use inventory::{InventoryParticipant, STOCK_RELEASE_REASON};
pub use order::OrderParticipant;
pub use payment::{PAYMENT_FAILURE_REASON, PaymentParticipant, PaymentSettings};
