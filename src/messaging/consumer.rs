//! # Consumer-side Channel Client
//!
//! Owns the ingest process's broker connection and hands out
//! explicit-acknowledgment delivery streams.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::connection::connect_with_retry;
use super::traits::{ChannelConnection, ChannelConnector};
use super::types::{MessageStream, RetryPolicy};
use super::{MessagingError, MessagingResult};
use crate::config::ConnectionUrl;

pub struct ChannelConsumer {
    connector: Arc<dyn ChannelConnector>,
    url: ConnectionUrl,
    queue_name: String,
    prefetch_count: u16,
    connection: Mutex<Option<Box<dyn ChannelConnection>>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for ChannelConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelConsumer")
            .field("provider", &self.connector.provider_name())
            .field("url", &self.url)
            .field("queue_name", &self.queue_name)
            .field("prefetch_count", &self.prefetch_count)
            .finish()
    }
}

impl ChannelConsumer {
    pub fn new(
        connector: Arc<dyn ChannelConnector>,
        url: ConnectionUrl,
        queue_name: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            url,
            queue_name: queue_name.into(),
            prefetch_count: 0,
            connection: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Cap unacknowledged deliveries per connection (0 = unlimited)
    pub fn with_prefetch(mut self, prefetch_count: u16) -> Self {
        self.prefetch_count = prefetch_count;
        self
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Startup connect with bounded retry, then provision the queue
    pub async fn connect(&self, policy: RetryPolicy) -> MessagingResult<()> {
        let connection = connect_with_retry(self.connector.as_ref(), self.url.expose(), policy).await?;
        self.prepare(connection.as_ref()).await?;
        *self.connection.lock().await = Some(connection);

        info!(
            broker = %self.url,
            queue = %self.queue_name,
            prefetch = self.prefetch_count,
            "Consumer connected"
        );
        Ok(())
    }

    /// Declare the durable queue on the current connection. Safe to repeat.
    pub async fn ensure_queue(&self) -> MessagingResult<()> {
        let guard = self.connection.lock().await;
        match guard.as_ref() {
            Some(connection) if connection.is_connected() => {
                connection.declare_queue(&self.queue_name).await
            }
            _ => Err(MessagingError::not_connected(&self.queue_name)),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .await
            .as_ref()
            .is_some_and(|c| c.is_connected())
    }

    /// Open a delivery stream. A dropped connection is replaced first with a
    /// single connect attempt, so a caller can restart consumption after the
    /// previous stream ended with a connection error.
    pub async fn consume(&self) -> MessagingResult<MessageStream> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MessagingError::not_connected(&self.queue_name));
        }

        let mut guard = self.connection.lock().await;
        if !guard.as_ref().is_some_and(|c| c.is_connected()) {
            if let Some(stale) = guard.take() {
                if let Err(e) = stale.close().await {
                    debug!(error = %e, "Ignoring error while closing dropped connection");
                }
            }
            warn!(broker = %self.url, "Consumer connection lost; reconnecting");
            let fresh = connect_with_retry(
                self.connector.as_ref(),
                self.url.expose(),
                RetryPolicy::once(),
            )
            .await?;
            self.prepare(fresh.as_ref()).await?;
            *guard = Some(fresh);
        }

        let Some(connection) = guard.as_ref() else {
            return Err(MessagingError::not_connected(&self.queue_name));
        };

        let consumer_tag = format!("pingwatch-ingest-{}", Uuid::new_v4());
        let stream = connection.consume(&self.queue_name, &consumer_tag).await?;
        info!(queue = %self.queue_name, consumer_tag = %consumer_tag, "Consuming");
        Ok(stream)
    }

    /// Release the connection. Idempotent. Unacked deliveries return to the
    /// queue when the broker sees the connection close.
    pub async fn close(&self) -> MessagingResult<()> {
        self.closed.store(true, Ordering::Release);
        let connection = self.connection.lock().await.take();
        if let Some(connection) = connection {
            connection.close().await?;
            info!(queue = %self.queue_name, "Consumer closed");
        }
        Ok(())
    }

    async fn prepare(&self, connection: &dyn ChannelConnection) -> MessagingResult<()> {
        connection.declare_queue(&self.queue_name).await?;
        if self.prefetch_count > 0 {
            connection.set_prefetch(self.prefetch_count).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::providers::InMemoryBroker;
    use futures::StreamExt;
    use std::time::Duration;

    const QUEUE: &str = "ping_results";

    fn consumer(broker: &InMemoryBroker) -> ChannelConsumer {
        ChannelConsumer::new(
            Arc::new(broker.clone()),
            ConnectionUrl::new("memory://test"),
            QUEUE,
        )
    }

    async fn seed(broker: &InMemoryBroker, payloads: &[&[u8]]) {
        let connection = broker.connect("memory://seed").await.unwrap();
        connection.declare_queue(QUEUE).await.unwrap();
        for payload in payloads {
            connection.publish(QUEUE, payload).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_consume_delivers_in_order() {
        let broker = InMemoryBroker::new();
        seed(&broker, &[b"1", b"2", b"3"]).await;

        let consumer = consumer(&broker);
        consumer
            .connect(RetryPolicy::new(1, Duration::ZERO))
            .await
            .unwrap();

        let mut stream = consumer.consume().await.unwrap();
        for expected in [b"1", b"2", b"3"] {
            let message = stream.next().await.unwrap().unwrap();
            assert_eq!(message.payload(), expected);
            message.ack().await.unwrap();
        }
        assert_eq!(broker.ready_count(QUEUE), 0);
    }

    #[tokio::test]
    async fn test_consume_restarts_after_sever() {
        let broker = InMemoryBroker::new();
        seed(&broker, &[b"only"]).await;

        let consumer = consumer(&broker);
        consumer
            .connect(RetryPolicy::new(1, Duration::ZERO))
            .await
            .unwrap();

        let mut stream = consumer.consume().await.unwrap();
        let unacked = stream.next().await.unwrap().unwrap();
        broker.sever_connections();
        drop(unacked);
        assert!(stream.next().await.unwrap().is_err());

        let mut stream = consumer.consume().await.unwrap();
        let message = stream.next().await.unwrap().unwrap();
        assert!(message.redelivered());
        message.ack().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_before_connect() {
        let broker = InMemoryBroker::new();
        let consumer = consumer(&broker);

        consumer.close().await.unwrap();
        consumer.close().await.unwrap();
        assert!(consumer.consume().await.is_err());
    }
}
