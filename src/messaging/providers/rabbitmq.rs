//! # RabbitMQ Provider
//!
//! AMQP 0.9.1 implementation of the channel contract using `lapin`.
//!
//! - **Durable queue**: declared durable, non-exclusive, not auto-delete
//! - **Persistent messages**: delivery mode 2, `application/json`
//! - **Explicit acknowledgment**: consumers never use `no_ack`; each
//!   delivery carries its own acker
//! - **Prefetch**: `basic_qos` on the channel, 0 means unlimited
//!
//! Publisher confirms are not enabled; a publish succeeds once the frame
//! has been handed to the connection.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tracing::debug;

use crate::constants::{AMQP_REPLY_SUCCESS, MESSAGE_CONTENT_TYPE, PERSISTENT_DELIVERY_MODE};
use crate::messaging::traits::{ChannelConnection, ChannelConnector, DeliveryAcker};
use crate::messaging::types::{ChannelMessage, MessageStream};
use crate::messaging::{MessagingError, MessagingResult};

/// Dials RabbitMQ and opens one channel per connection
#[derive(Debug, Clone)]
pub struct RabbitMqConnector {
    connection_name: String,
}

impl RabbitMqConnector {
    /// `connection_name` shows up in the RabbitMQ management UI
    pub fn new(connection_name: impl Into<String>) -> Self {
        Self {
            connection_name: connection_name.into(),
        }
    }
}

#[async_trait]
impl ChannelConnector for RabbitMqConnector {
    async fn connect(&self, url: &str) -> MessagingResult<Box<dyn ChannelConnection>> {
        let connection = Connection::connect(
            url,
            ConnectionProperties::default()
                .with_connection_name(self.connection_name.clone().into()),
        )
        .await
        .map_err(|e| MessagingError::connection(format!("RabbitMQ connection failed: {e}")))?;

        let channel = connection.create_channel().await.map_err(|e| {
            MessagingError::connection(format!("RabbitMQ channel creation failed: {e}"))
        })?;

        Ok(Box::new(RabbitMqConnection {
            connection,
            channel,
        }))
    }

    fn provider_name(&self) -> &'static str {
        "rabbitmq"
    }
}

#[derive(Debug)]
pub struct RabbitMqConnection {
    connection: Connection,
    channel: Channel,
}

#[async_trait]
impl ChannelConnection for RabbitMqConnection {
    fn is_connected(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    async fn declare_queue(&self, queue_name: &str) -> MessagingResult<()> {
        self.channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| classify(e, |msg| MessagingError::queue_creation(queue_name, msg)))?;
        Ok(())
    }

    async fn publish(&self, queue_name: &str, payload: &[u8]) -> MessagingResult<()> {
        self.channel
            .basic_publish(
                "",         // Default exchange
                queue_name, // Routing key = queue name
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_delivery_mode(PERSISTENT_DELIVERY_MODE)
                    .with_content_type(MESSAGE_CONTENT_TYPE.into()),
            )
            .await
            .map_err(|e| classify(e, |msg| MessagingError::send(queue_name, msg)))?;
        Ok(())
    }

    async fn set_prefetch(&self, count: u16) -> MessagingResult<()> {
        self.channel
            .basic_qos(count, BasicQosOptions::default())
            .await
            .map_err(|e| classify(e, |msg| MessagingError::internal(format!("Failed to set QoS: {msg}"))))
    }

    async fn consume(&self, queue_name: &str, consumer_tag: &str) -> MessagingResult<MessageStream> {
        let consumer = self
            .channel
            .basic_consume(
                queue_name,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| classify(e, |msg| MessagingError::consume(queue_name, msg)))?;

        debug!(queue = queue_name, consumer_tag, "RabbitMQ consumer started");

        let queue = queue_name.to_string();
        let stream = consumer.map(move |delivery| -> MessagingResult<ChannelMessage> {
            let delivery = delivery.map_err(MessagingError::from)?;
            let acker = RabbitMqAcker {
                acker: delivery.acker,
                queue_name: queue.clone(),
            };
            Ok(ChannelMessage::new(
                delivery.data,
                delivery.delivery_tag,
                delivery.redelivered,
                Box::new(acker),
            ))
        });

        Ok(Box::pin(stream))
    }

    async fn close(&self) -> MessagingResult<()> {
        if self.channel.status().connected() {
            self.channel
                .close(AMQP_REPLY_SUCCESS, "closing")
                .await
                .map_err(MessagingError::from)?;
        }
        if self.connection.status().connected() {
            self.connection
                .close(AMQP_REPLY_SUCCESS, "closing")
                .await
                .map_err(MessagingError::from)?;
        }
        Ok(())
    }
}

/// Connection-class lapin errors stay `Connection` so callers reconnect;
/// anything else is reported through the operation-specific constructor.
fn classify(err: lapin::Error, other: impl FnOnce(String) -> MessagingError) -> MessagingError {
    match MessagingError::from(err) {
        e @ MessagingError::Connection { .. } => e,
        e => other(e.to_string()),
    }
}

struct RabbitMqAcker {
    acker: Acker,
    queue_name: String,
}

#[async_trait]
impl DeliveryAcker for RabbitMqAcker {
    async fn ack(&self, delivery_tag: u64) -> MessagingResult<()> {
        self.acker
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| classify(e, |msg| MessagingError::ack(&self.queue_name, delivery_tag, msg)))
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> MessagingResult<()> {
        self.acker
            .nack(BasicNackOptions {
                requeue,
                ..Default::default()
            })
            .await
            .map(|_| ())
            .map_err(|e| classify(e, |msg| MessagingError::nack(&self.queue_name, delivery_tag, msg)))
    }
}
