//! Broker client for the event-driven services.
//!
//! [`BrokerClient`] is the channel-level contract every service talks to:
//! declare queues and exchanges, bind them, publish persistent messages and
//! consume deliveries that must be settled explicitly. Two implementations
//! are provided:
//!
//! - [`InMemoryBroker`] / [`InMemoryClient`]: a process-local broker with
//!   direct, fanout and topic routing, prefetch limits, dead-lettering and
//!   restart simulation. Used by tests and single-process deployments.
//! - `AmqpClient` (feature `amqp`): RabbitMQ over AMQP 0-9-1 via `lapin`.

#[cfg(feature = "amqp")]
pub mod amqp;
pub mod client;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod publisher;
pub mod reconnect;
pub mod settings;
pub mod topic;

#[cfg(feature = "amqp")]
pub use amqp::AmqpClient;
pub use client::{
    Acker, BrokerClient, BrokerClientExt, Delivery, DeliveryStream, ExchangeKind, QueueHandle,
    QueueOptions, Settlement,
};
pub use envelope::{JSON_CONTENT_TYPE, MessageEnvelope, RETRY_COUNT_HEADER};
pub use error::{BrokerError, Result};
pub use memory::{InMemoryBroker, InMemoryClient};
pub use publisher::EventPublisher;
pub use reconnect::connect_with_retry;
pub use settings::ConnectionSettings;
