//! Storage owned by the saga participants, with in-memory implementations.

pub mod inventory;
pub mod order;

pub use inventory::{
    InMemoryInventoryStore, InventoryItem, InventoryStore, ReleaseOutcome, Reservation,
    ReserveOutcome,
};
pub use order::{InMemoryOrderStore, Order, OrderStore};
