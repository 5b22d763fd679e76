use broker::BrokerError;
use consumer::HandlerError;
use thiserror::Error;

/// Errors raised by the leaf workers.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The mailer could not deliver.
    #[error("Mail delivery to {recipient} failed: {reason}")]
    Mail { recipient: String, reason: String },

    /// The blocking report computation did not finish.
    #[error("Report job {job_id} failed: {reason}")]
    Report { job_id: String, reason: String },

    /// The report worker pool was shut down.
    #[error("Report worker pool closed")]
    PoolClosed,

    #[error("Publish failed: {0}")]
    Publish(#[from] BrokerError),
}

impl From<WorkerError> for HandlerError {
    fn from(error: WorkerError) -> Self {
        match error {
            WorkerError::Publish(e) => HandlerError::Publish(e),
            other => HandlerError::other(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;
