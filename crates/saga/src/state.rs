//! Order status state machine.

use serde::{Deserialize, Serialize};

use crate::error::SagaError;

/// The status of an order as seen by the order participant.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Completed
///           └──► Failed
/// ```
/// Moving to the current status again is allowed and changes nothing, so
/// redelivered events are harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Created; saga in progress.
    #[default]
    Pending,

    /// Payment succeeded (terminal state).
    Completed,

    /// Payment failed and the saga compensated (terminal state).
    Failed,
}

impl OrderStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Failed)
    }

    /// Validates a transition and returns the new status.
    pub fn transition(self, to: OrderStatus) -> Result<OrderStatus, SagaError> {
        match (self, to) {
            (from, to) if from == to => Ok(to),
            (OrderStatus::Pending, to) => Ok(to),
            (from, to) => Err(SagaError::InvalidTransition { from, to }),
        }
    }

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
