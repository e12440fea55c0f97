//! # Publisher-side Channel Client
//!
//! Owns the producer's broker connection. Liveness is checked lazily on
//! every publish: a dropped connection is replaced (one connect attempt plus
//! queue re-declare) right before the publish that notices it. There is no
//! background watchdog.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use super::connection::connect_with_retry;
use super::traits::{ChannelConnection, ChannelConnector, QueueMessage, ResultPublisher};
use super::types::RetryPolicy;
use super::{MessagingError, MessagingResult};
use crate::config::ConnectionUrl;
use crate::models::ProbeResult;

/// Point-in-time publisher counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherStats {
    pub published: u64,
    pub failed: u64,
    pub reconnects: u64,
}

#[derive(Debug, Default)]
struct AtomicPublisherStats {
    published: AtomicU64,
    failed: AtomicU64,
    reconnects: AtomicU64,
}

pub struct ChannelPublisher {
    connector: Arc<dyn ChannelConnector>,
    url: ConnectionUrl,
    queue_name: String,
    connection: Mutex<Option<Box<dyn ChannelConnection>>>,
    closed: AtomicBool,
    stats: AtomicPublisherStats,
}

impl std::fmt::Debug for ChannelPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelPublisher")
            .field("provider", &self.connector.provider_name())
            .field("url", &self.url)
            .field("queue_name", &self.queue_name)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl ChannelPublisher {
    /// Create an unconnected publisher. Call [`connect`](Self::connect) at
    /// startup; later publishes reconnect on their own.
    pub fn new(
        connector: Arc<dyn ChannelConnector>,
        url: ConnectionUrl,
        queue_name: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            url,
            queue_name: queue_name.into(),
            connection: Mutex::new(None),
            closed: AtomicBool::new(false),
            stats: AtomicPublisherStats::default(),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Startup connect with bounded retry, then provision the queue
    pub async fn connect(&self, policy: RetryPolicy) -> MessagingResult<()> {
        let connection = connect_with_retry(self.connector.as_ref(), self.url.expose(), policy).await?;
        connection.declare_queue(&self.queue_name).await?;
        *self.connection.lock().await = Some(connection);

        info!(
            broker = %self.url,
            queue = %self.queue_name,
            "Publisher connected"
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

    /// Serialize and publish one result, reconnecting first if the
    /// connection was dropped. Failures are returned, never retried.
    #[instrument(skip(self, result), fields(queue = %self.queue_name, address = %result.address))]
    pub async fn publish_result(&self, result: &ProbeResult) -> MessagingResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MessagingError::not_connected(&self.queue_name));
        }

        let payload = result.to_bytes()?;
        let mut guard = self.connection.lock().await;

        if !guard.as_ref().is_some_and(|c| c.is_connected()) {
            if let Some(stale) = guard.take() {
                if let Err(e) = stale.close().await {
                    debug!(error = %e, "Ignoring error while closing dropped connection");
                }
            }
            warn!(broker = %self.url, "Publisher connection lost; reconnecting");
            let fresh = self.reconnect().await.inspect_err(|_| {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
            })?;
            *guard = Some(fresh);
        }

        let Some(connection) = guard.as_ref() else {
            return Err(MessagingError::not_connected(&self.queue_name));
        };

        match connection.publish(&self.queue_name, &payload).await {
            Ok(()) => {
                self.stats.published.fetch_add(1, Ordering::Relaxed);
                debug!(bytes = payload.len(), "Published probe result");
                Ok(())
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                if e.is_connection_error() {
                    // Next publish starts from a fresh connection
                    guard.take();
                }
                error!(error = %e, "Failed to publish probe result");
                Err(e)
            }
        }
    }

    /// Release the connection. Idempotent; later publishes fail fast.
    pub async fn close(&self) -> MessagingResult<()> {
        self.closed.store(true, Ordering::Release);
        let connection = self.connection.lock().await.take();
        if let Some(connection) = connection {
            connection.close().await?;
            info!(queue = %self.queue_name, "Publisher closed");
        }
        Ok(())
    }

    pub fn stats(&self) -> PublisherStats {
        PublisherStats {
            published: self.stats.published.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            reconnects: self.stats.reconnects.load(Ordering::Relaxed),
        }
    }

    async fn reconnect(&self) -> MessagingResult<Box<dyn ChannelConnection>> {
        let connection = connect_with_retry(
            self.connector.as_ref(),
            self.url.expose(),
            RetryPolicy::once(),
        )
        .await?;
        connection.declare_queue(&self.queue_name).await?;
        self.stats.reconnects.fetch_add(1, Ordering::Relaxed);
        info!(broker = %self.url, queue = %self.queue_name, "Publisher reconnected");
        Ok(connection)
    }
}

#[async_trait]
impl ResultPublisher for ChannelPublisher {
    async fn publish(&self, result: &ProbeResult) -> MessagingResult<()> {
        self.publish_result(result).await
    }
}
