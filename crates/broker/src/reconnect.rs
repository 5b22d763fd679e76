//! Bounded connect/reconnect policy shared by every transport.

use std::future::Future;

use crate::error::{BrokerError, Result};
use crate::settings::ConnectionSettings;

/// Runs `attempt` until it succeeds or `settings.max_connect_attempts` is
/// exhausted.
///
/// Each attempt is bounded by `connect_timeout`; attempts are separated by
/// `reconnect_interval`. The closure receives the 1-based attempt number.
pub async fn connect_with_retry<T, F, Fut>(settings: &ConnectionSettings, mut attempt: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = settings.max_connect_attempts.max(1);
    let mut last_error = String::new();

    for n in 1..=max_attempts {
        metrics::counter!("broker_connect_attempts_total").increment(1);

        match tokio::time::timeout(settings.connect_timeout, attempt(n)).await {
            Ok(Ok(connection)) => {
                tracing::info!(attempt = n, "connected to broker");
                return Ok(connection);
            }
            Ok(Err(e)) => {
                tracing::warn!(attempt = n, max_attempts, error = %e, "broker connection attempt failed");
                last_error = e.to_string();
            }
            Err(_) => {
                tracing::warn!(
                    attempt = n,
                    max_attempts,
                    timeout_ms = settings.connect_timeout.as_millis() as u64,
                    "broker connection attempt timed out"
                );
                last_error = format!("timed out after {:?}", settings.connect_timeout);
            }
        }

        if n < max_attempts {
            tokio::time::sleep(settings.reconnect_interval).await;
        }
    }

    tracing::error!(attempts = max_attempts, error = %last_error, "giving up connecting to broker");
    Err(BrokerError::Connection {
        attempts: max_attempts,
        reason: last_error,
    })
}
