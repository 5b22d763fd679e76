//! Consumer error types.

use broker::BrokerError;
use events::ValidationError;
use thiserror::Error;

/// Errors that stop a consumer's run loop.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// Declaring or subscribing failed.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// The delivery stream failed or ended.
    #[error("Connection lost while consuming from {queue}")]
    ConnectionLost {
        queue: String,
        #[source]
        source: Option<BrokerError>,
    },

    /// The consumer was configured with an unusable queue or exchange name.
    #[error("Invalid queue configuration: {0}")]
    InvalidQueue(String),
}

/// Result type for consumer operations.
pub type Result<T> = std::result::Result<T, ConsumerError>;

/// Why a handler could not process a message.
///
/// Every variant counts as a handler failure and goes through the retry
/// policy.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The body did not decode into the expected event.
    #[error("Malformed message: {0}")]
    Decode(#[from] ValidationError),

    /// Publishing a follow-up event failed.
    #[error("Publish failed: {0}")]
    Publish(#[from] BrokerError),

    /// The handler panicked.
    #[error("Handler panicked: {0}")]
    Panicked(String),

    /// A domain-level failure reported by the handler.
    #[error("{0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// Creates a failure from a message.
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }

    /// Wraps any error as a handler failure.
    pub fn other<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        HandlerError::Other(Box::new(error))
    }

    /// Returns true if the message itself is bad rather than the handler.
    pub fn is_malformed_message(&self) -> bool {
        matches!(self, HandlerError::Decode(_))
    }
}
