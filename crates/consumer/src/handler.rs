use async_trait::async_trait;
use events::Event;

use crate::context::ServiceContext;
use crate::error::HandlerError;

/// Business logic for one event type.
///
/// Returning `Ok` acks the message; returning `Err` (or panicking) sends it
/// through the retry policy. Handlers must be idempotent: a message can be
/// delivered more than once.
#[async_trait]
pub trait Handler<E: Event>: Send + Sync {
    /// Name used in logs and the consumer tag.
    fn name(&self) -> &'static str;

    /// Handles a decoded event.
    async fn handle(&self, event: E, ctx: &ServiceContext) -> Result<(), HandlerError>;
}
