//! RabbitMQ transport over AMQP 0-9-1.
//!
//! One connection and one channel per client. Prefetch is applied per
//! consumer with `basic.qos`. Retries are implemented by republishing a copy
//! with an incremented `x-retry-count` header to the default exchange (so it
//! lands at the tail of the same queue) and then acking the original.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    BasicRejectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};

use crate::client::{
    Acker, BrokerClient, Delivery, DeliveryStream, ExchangeKind, QueueHandle, QueueOptions,
    Settlement,
};
use crate::envelope::{JSON_CONTENT_TYPE, MessageEnvelope, RETRY_COUNT_HEADER};
use crate::error::Result;
use crate::reconnect::connect_with_retry;
use crate::settings::ConnectionSettings;

const DEAD_LETTER_EXCHANGE_ARG: &str = "x-dead-letter-exchange";
const PERSISTENT_DELIVERY_MODE: u8 = 2;
const TRANSIENT_DELIVERY_MODE: u8 = 1;

/// A RabbitMQ connection with a single channel.
pub struct AmqpClient {
    connection: Connection,
    channel: Channel,
    closed: AtomicBool,
}

impl AmqpClient {
    /// Connects and opens a channel, retrying according to `settings`.
    pub async fn connect(settings: &ConnectionSettings) -> Result<Self> {
        let uri = settings.amqp_uri();
        let prefetch = settings.prefetch_count;
        tracing::info!(uri = %settings.redacted_uri(), prefetch, "connecting to RabbitMQ");

        connect_with_retry(settings, |_| {
            let uri = uri.clone();
            async move {
                let connection = Connection::connect(&uri, ConnectionProperties::default()).await?;
                let channel = connection.create_channel().await?;
                channel
                    .basic_qos(prefetch, BasicQosOptions::default())
                    .await?;
                Ok(Self {
                    connection,
                    channel,
                    closed: AtomicBool::new(false),
                })
            }
        })
        .await
    }
}

fn exchange_kind(kind: ExchangeKind) -> lapin::ExchangeKind {
    match kind {
        ExchangeKind::Direct => lapin::ExchangeKind::Direct,
        ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
        ExchangeKind::Topic => lapin::ExchangeKind::Topic,
    }
}

fn retry_count_from_headers(headers: &Option<FieldTable>) -> u32 {
    headers
        .as_ref()
        .and_then(|table| {
            table
                .inner()
                .iter()
                .find(|(key, _)| key.as_str() == RETRY_COUNT_HEADER)
                .map(|(_, value)| value)
        })
        .and_then(header_as_u32)
        .unwrap_or(0)
}

fn header_as_u32(value: &AMQPValue) -> Option<u32> {
    match value {
        AMQPValue::ShortShortInt(n) => u32::try_from(*n).ok(),
        AMQPValue::ShortShortUInt(n) => Some(u32::from(*n)),
        AMQPValue::ShortInt(n) => u32::try_from(*n).ok(),
        AMQPValue::ShortUInt(n) => Some(u32::from(*n)),
        AMQPValue::LongInt(n) => u32::try_from(*n).ok(),
        AMQPValue::LongUInt(n) => Some(*n),
        AMQPValue::LongLongInt(n) => u32::try_from(*n).ok(),
        _ => None,
    }
}

async fn publish_on(
    channel: &Channel,
    exchange: &str,
    routing_key: &str,
    message: &MessageEnvelope,
) -> Result<()> {
    let mut headers = FieldTable::default();
    if message.retry_count > 0 {
        let count = i64::from(message.retry_count);
        headers.insert(RETRY_COUNT_HEADER.into(), AMQPValue::LongLongInt(count));
    }

    let content_type = if message.content_type.is_empty() {
        JSON_CONTENT_TYPE
    } else {
        message.content_type.as_str()
    };
    let delivery_mode = if message.persistent {
        PERSISTENT_DELIVERY_MODE
    } else {
        TRANSIENT_DELIVERY_MODE
    };
    let properties = BasicProperties::default()
        .with_content_type(content_type.into())
        .with_delivery_mode(delivery_mode)
        .with_message_id(message.message_id.as_str().into())
        .with_headers(headers);

    channel
        .basic_publish(
            exchange,
            routing_key,
            BasicPublishOptions::default(),
            &message.body,
            properties,
        )
        .await?
        .await?;
    Ok(())
}

fn into_delivery(delivery: lapin::message::Delivery, queue: &str, channel: &Channel) -> Delivery {
    let properties = &delivery.properties;
    let envelope = MessageEnvelope {
        message_id: properties
            .message_id()
            .as_ref()
            .map(|id| id.as_str().to_string())
            .unwrap_or_default(),
        content_type: properties
            .content_type()
            .as_ref()
            .map(|ct| ct.as_str().to_string())
            .unwrap_or_default(),
        persistent: *properties.delivery_mode() == Some(PERSISTENT_DELIVERY_MODE),
        retry_count: retry_count_from_headers(properties.headers()),
        exchange: delivery.exchange.as_str().to_string(),
        routing_key: delivery.routing_key.as_str().to_string(),
        published_at: chrono::Utc::now(),
        body: delivery.data,
    };

    let acker = AmqpAcker {
        acker: delivery.acker,
        channel: channel.clone(),
        queue: queue.to_string(),
    };
    Delivery::new(
        envelope,
        queue,
        delivery.delivery_tag,
        delivery.redelivered,
        Box::new(acker),
    )
}

struct AmqpAcker {
    acker: lapin::acker::Acker,
    channel: Channel,
    queue: String,
}

#[async_trait]
impl Acker for AmqpAcker {
    async fn settle(self: Box<Self>, envelope: MessageEnvelope, settlement: Settlement) -> Result<()> {
        match settlement {
            Settlement::Ack => {
                self.acker.ack(BasicAckOptions::default()).await?;
            }
            Settlement::Requeue => {
                self.acker
                    .reject(BasicRejectOptions { requeue: true })
                    .await?;
            }
            Settlement::Retry { retry_count } => {
                let copy = envelope.with_retry_count(retry_count);
                publish_on(&self.channel, "", &self.queue, &copy).await?;
                self.acker.ack(BasicAckOptions::default()).await?;
            }
            Settlement::DeadLetter => {
                self.acker
                    .reject(BasicRejectOptions { requeue: false })
                    .await?;
            }
        }
        Ok(())
    }

    fn abandon(self: Box<Self>, _envelope: MessageEnvelope) {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let acker = self.acker;
            handle.spawn(async move {
                if let Err(e) = acker.reject(BasicRejectOptions { requeue: true }).await {
                    tracing::warn!(error = %e, "failed to requeue abandoned delivery");
                }
            });
        }
    }
}

#[async_trait]
impl BrokerClient for AmqpClient {
    async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<QueueHandle> {
        let mut arguments = FieldTable::default();
        if let Some(dlx) = &options.dead_letter_exchange {
            arguments.insert(
                DEAD_LETTER_EXCHANGE_ARG.into(),
                AMQPValue::LongString(dlx.clone().into()),
            );
        }

        let queue = self
            .channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: options.durable,
                    auto_delete: options.auto_delete,
                    ..QueueDeclareOptions::default()
                },
                arguments,
            )
            .await?;

        Ok(QueueHandle {
            name: queue.name().as_str().to_string(),
            message_count: queue.message_count(),
            consumer_count: queue.consumer_count(),
        })
    }

    async fn declare_exchange(&self, name: &str, kind: ExchangeKind, durable: bool) -> Result<()> {
        self.channel
            .exchange_declare(
                name,
                exchange_kind(kind),
                ExchangeDeclareOptions {
                    durable,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn bind(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn publish(&self, exchange: &str, routing_key: &str, message: MessageEnvelope) -> Result<()> {
        publish_on(&self.channel, exchange, routing_key, &message).await
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let channel = self.channel.clone();
        let queue = queue.to_string();
        let deliveries = consumer.map(move |result| {
            let delivery = result?;
            Ok(into_delivery(delivery, &queue, &channel))
        });
        Ok(Box::pin(deliveries))
    }

    async fn disconnect(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.channel.close(200, "Bye").await {
            tracing::debug!(error = %e, "channel close failed");
        }
        if let Err(e) = self.connection.close(200, "Bye").await {
            tracing::debug!(error = %e, "connection close failed");
        }
        tracing::info!("disconnected from RabbitMQ");
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.connection.status().connected()
    }
}
