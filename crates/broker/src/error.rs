use events::EncodeError;
use thiserror::Error;

/// Errors that can occur when talking to the message broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker could not be reached within the configured attempts.
    #[error("Failed to connect to broker after {attempts} attempt(s): {reason}")]
    Connection { attempts: u32, reason: String },

    /// The channel or connection has been closed.
    #[error("Broker channel is closed")]
    ChannelClosed,

    /// The queue does not exist.
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    /// The exchange does not exist.
    #[error("Exchange not found: {0}")]
    ExchangeNotFound(String),

    /// A declaration conflicts with an existing entity, or the operation is
    /// not allowed on the target.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// An event could not be encoded for publishing.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An AMQP protocol or transport error occurred.
    #[cfg(feature = "amqp")]
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),
}

impl BrokerError {
    /// Returns true if the error means the connection to the broker is gone.
    pub fn is_connectivity(&self) -> bool {
        match self {
            BrokerError::Connection { .. } | BrokerError::ChannelClosed => true,
            #[cfg(feature = "amqp")]
            BrokerError::Amqp(_) => true,
            _ => false,
        }
    }
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
