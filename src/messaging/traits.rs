//! # Channel Traits
//!
//! Provider-agnostic contract for the durable channel. A provider supplies a
//! [`ChannelConnector`]; everything above it (publisher, consumer, retry) is
//! written against these traits only.

use async_trait::async_trait;

use super::types::MessageStream;
use super::MessagingResult;
use crate::models::ProbeResult;

/// Dials the broker. One connector per provider; connections are cheap to
/// replace, connectors are long-lived.
#[async_trait]
pub trait ChannelConnector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> MessagingResult<Box<dyn ChannelConnection>>;

    /// Provider name for logging ("rabbitmq", "in_memory")
    fn provider_name(&self) -> &'static str;
}

/// An open connection with one channel on it.
///
/// A connection is owned by exactly one client and never shared across tasks.
#[async_trait]
pub trait ChannelConnection: Send + Sync {
    /// Lazy liveness check; no network round trip
    fn is_connected(&self) -> bool;

    /// Declare a durable, non-exclusive queue. Idempotent.
    async fn declare_queue(&self, queue_name: &str) -> MessagingResult<()>;

    /// Publish to the default exchange with the queue name as routing key,
    /// persistent delivery mode. Success means the broker accepted the frame;
    /// there is no publisher confirm.
    async fn publish(&self, queue_name: &str, payload: &[u8]) -> MessagingResult<()>;

    /// Limit unacknowledged deliveries on this channel (0 = unlimited)
    async fn set_prefetch(&self, count: u16) -> MessagingResult<()>;

    /// Start an explicit-acknowledgment consumer
    async fn consume(&self, queue_name: &str, consumer_tag: &str) -> MessagingResult<MessageStream>;

    /// Close channel and connection. Closing twice is not an error.
    async fn close(&self) -> MessagingResult<()>;
}

/// Settles a single delivery with the broker
#[async_trait]
pub trait DeliveryAcker: Send + Sync {
    async fn ack(&self, delivery_tag: u64) -> MessagingResult<()>;

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> MessagingResult<()>;
}

/// Where the scheduler sends each probe result
#[async_trait]
pub trait ResultPublisher: Send + Sync {
    async fn publish(&self, result: &ProbeResult) -> MessagingResult<()>;
}

/// Message serialization contract
///
/// JSON via serde is the only wire format; the blanket implementation covers
/// every serde type.
pub trait QueueMessage: Send + Sync + Sized + 'static {
    fn to_bytes(&self) -> MessagingResult<Vec<u8>>;

    fn from_bytes(bytes: &[u8]) -> MessagingResult<Self>;
}

impl<T> QueueMessage for T
where
    T: serde::Serialize + serde::de::DeserializeOwned + Send + Sync + 'static,
{
    fn to_bytes(&self) -> MessagingResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| super::MessagingError::message_serialization(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> MessagingResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| super::MessagingError::message_deserialization(e.to_string()))
    }
}
