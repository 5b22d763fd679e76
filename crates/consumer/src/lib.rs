//! Reliable message consumption.
//!
//! A [`Consumer`] pulls deliveries from one queue, decodes each body into a
//! typed event and hands it to a [`Handler`]. The outcome decides how the
//! delivery is settled:
//!
//! - success: acked, exactly once
//! - failure (including decode errors and panics): republished with an
//!   incremented `x-retry-count` until [`RetryPolicy`] gives up, then
//!   dead-lettered
//! - shutdown: in-flight handlers get a grace period, after which their
//!   messages are requeued untouched
//!
//! [`FanoutConsumer`] adds the per-service queue declaration and binding for
//! fanout exchanges. Everything a consumer needs is passed in through a
//! [`ServiceContext`].

pub mod consumer;
pub mod context;
pub mod error;
pub mod fanout;
pub mod handler;
pub mod retry;
pub mod shutdown;

pub use consumer::Consumer;
pub use context::{ConsumerSettings, ServiceContext};
pub use error::{ConsumerError, HandlerError, Result};
pub use fanout::FanoutConsumer;
pub use handler::Handler;
pub use retry::{RetryDecision, RetryPolicy};
pub use shutdown::ShutdownSignal;
