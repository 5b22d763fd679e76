//! Application configuration loaded from environment variables.

use std::time::Duration;

use broker::ConnectionSettings;
use consumer::{ConsumerSettings, RetryPolicy};
use thiserror::Error;

use crate::service::Service;

/// Log output format for the `fmt` layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Which broker the services talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrokerKind {
    /// In-process broker; only useful with `SERVICE=all` or in tests.
    #[default]
    Memory,
    /// RabbitMQ over AMQP. Requires the `amqp` feature.
    Amqp,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Service configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `SERVICE`: which service to run, or `all` (default: `all`)
/// - `HOST` / `PORT`: bind address (default: `0.0.0.0:8000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `BROKER`: `memory` or `amqp` (default: `memory`)
/// - `RABBITMQ_HOST`, `RABBITMQ_PORT`, `RABBITMQ_USER`, `RABBITMQ_PASSWORD`,
///   `RABBITMQ_VHOST`: broker connection
/// - `BROKER_PREFETCH`: unacked deliveries per consumer (default: `10`)
/// - `CONSUMER_MAX_RETRIES`: redeliveries before dead-lettering (default: `3`)
/// - `SHUTDOWN_GRACE_SECS`: grace period for in-flight handlers (default: `10`)
/// - `DEAD_LETTER_CAPACITY`: dead letters the in-memory broker keeps per queue
///   (default: `1000`)
#[derive(Debug, Clone)]
pub struct Config {
    pub service: Service,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub broker: BrokerKind,
    pub connection: ConnectionSettings,
    pub consumer: ConsumerSettings,
    pub dead_letter_capacity: usize,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// unset variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let connection_defaults = defaults.connection.clone();

        let service = match lookup("SERVICE") {
            Some(value) => value.parse().map_err(|reason| ConfigError::Invalid {
                var: "SERVICE",
                value,
                reason,
            })?,
            None => defaults.service,
        };
        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => return Err(invalid("LOG_FORMAT", other, "expected text or json")),
        };
        let broker = match lookup("BROKER").as_deref() {
            None | Some("memory") => BrokerKind::Memory,
            Some("amqp") => BrokerKind::Amqp,
            Some(other) => return Err(invalid("BROKER", other, "expected memory or amqp")),
        };

        let connection = ConnectionSettings {
            host: lookup("RABBITMQ_HOST").unwrap_or(connection_defaults.host),
            port: parsed(&lookup, "RABBITMQ_PORT", connection_defaults.port)?,
            user: lookup("RABBITMQ_USER").unwrap_or(connection_defaults.user),
            password: lookup("RABBITMQ_PASSWORD").unwrap_or(connection_defaults.password),
            vhost: lookup("RABBITMQ_VHOST").unwrap_or(connection_defaults.vhost),
            prefetch_count: parsed(&lookup, "BROKER_PREFETCH", connection_defaults.prefetch_count)?,
            ..connection_defaults
        };
        let consumer = ConsumerSettings {
            retry: RetryPolicy::new(parsed(
                &lookup,
                "CONSUMER_MAX_RETRIES",
                defaults.consumer.retry.max_retries,
            )?),
            shutdown_grace: Duration::from_secs(parsed(
                &lookup,
                "SHUTDOWN_GRACE_SECS",
                defaults.consumer.shutdown_grace.as_secs(),
            )?),
        };

        Ok(Self {
            service,
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT", defaults.port)?,
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
            broker,
            connection,
            consumer,
            dead_letter_capacity: parsed(&lookup, "DEAD_LETTER_CAPACITY", defaults.dead_letter_capacity)?,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn invalid(var: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(var, &value, &e.to_string())),
        None => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: Service::All,
            host: "0.0.0.0".to_string(),
            port: 8000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            broker: BrokerKind::Memory,
            connection: ConnectionSettings::default(),
            consumer: ConsumerSettings::default(),
            dead_letter_capacity: broker::InMemoryBroker::DEFAULT_DEAD_LETTER_CAPACITY,
        }
    }
}
