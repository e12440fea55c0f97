//! # Channel Types

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use futures::Stream;

use super::traits::{DeliveryAcker, QueueMessage};
use super::MessagingResult;

/// Lazy sequence of deliveries from one consumer.
///
/// An `Err` item means the consumer can no longer make progress (connection
/// or channel closed); the stream ends after yielding it.
pub type MessageStream = Pin<Box<dyn Stream<Item = MessagingResult<ChannelMessage>> + Send>>;

/// One delivery: the serialized payload plus the handle needed to settle it.
///
/// `ack` and `nack` take `self`, so a delivery can be settled at most once.
/// Dropping an unsettled message leaves it in the broker's unacked set until
/// the connection closes, after which the broker redelivers it.
pub struct ChannelMessage {
    payload: Vec<u8>,
    delivery_tag: u64,
    redelivered: bool,
    acker: Box<dyn DeliveryAcker>,
}

impl ChannelMessage {
    pub fn new(
        payload: Vec<u8>,
        delivery_tag: u64,
        redelivered: bool,
        acker: Box<dyn DeliveryAcker>,
    ) -> Self {
        Self {
            payload,
            delivery_tag,
            redelivered,
            acker,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }

    /// Whether the broker delivered this message before
    pub fn redelivered(&self) -> bool {
        self.redelivered
    }

    pub fn decode<T: QueueMessage>(&self) -> MessagingResult<T> {
        T::from_bytes(&self.payload)
    }

    pub async fn ack(self) -> MessagingResult<()> {
        self.acker.ack(self.delivery_tag).await
    }

    pub async fn nack(self, requeue: bool) -> MessagingResult<()> {
        self.acker.nack(self.delivery_tag, requeue).await
    }
}

impl fmt::Debug for ChannelMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelMessage")
            .field("delivery_tag", &self.delivery_tag)
            .field("redelivered", &self.redelivered)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// Startup connection policy: fixed attempt count, constant backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// A single attempt, used for lazy reconnects
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}
