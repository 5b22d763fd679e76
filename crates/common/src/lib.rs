//! Shared types used across the event-driven services.

pub mod topology;
pub mod types;

pub use types::{OrderId, ProductId, UserId, prefixed_id};
