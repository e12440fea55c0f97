//! # In-Memory Broker
//!
//! Process-local implementation of the channel contract for tests and local
//! development.
//!
//! ## Features
//!
//! - **Durable named queues**: queues and their messages outlive connections
//! - **Explicit acknowledgment**: deliveries sit in an unacked set until
//!   acked or nacked
//! - **Redelivery**: closing or severing a connection returns its unacked
//!   deliveries to the head of the queue, flagged `redelivered`
//! - **Fault injection**: sever every open connection, refuse the next N
//!   connects, or refuse all connects
//!
//! Cloning the broker yields another handle to the same queues.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use crate::messaging::traits::{ChannelConnection, ChannelConnector, DeliveryAcker};
use crate::messaging::types::{ChannelMessage, MessageStream};
use crate::messaging::{MessagingError, MessagingResult};

#[derive(Debug, Clone)]
struct StoredMessage {
    payload: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug)]
struct Unacked {
    connection_id: u64,
    message: StoredMessage,
}

/// Counters for one queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InMemoryQueueStats {
    pub published: u64,
    pub delivered: u64,
    pub acked: u64,
    pub nacked: u64,
    pub redelivered: u64,
}

#[derive(Debug, Default)]
struct InMemoryQueue {
    ready: VecDeque<StoredMessage>,
    unacked: HashMap<u64, Unacked>,
    next_tag: u64,
    stats: InMemoryQueueStats,
}

impl InMemoryQueue {
    /// Return every unacked delivery owned by `connection_id` to the head of
    /// the queue, preserving delivery order.
    fn requeue_connection(&mut self, connection_id: u64) {
        let mut tags: Vec<u64> = self
            .unacked
            .iter()
            .filter(|(_, u)| u.connection_id == connection_id)
            .map(|(tag, _)| *tag)
            .collect();
        tags.sort_unstable();

        for tag in tags.into_iter().rev() {
            if let Some(unacked) = self.unacked.remove(&tag) {
                self.ready.push_front(StoredMessage {
                    redelivered: true,
                    ..unacked.message
                });
                self.stats.redelivered += 1;
            }
        }
    }

    fn in_flight(&self, connection_id: u64) -> usize {
        self.unacked
            .values()
            .filter(|u| u.connection_id == connection_id)
            .count()
    }
}

#[derive(Debug, Default)]
struct BrokerInner {
    queues: HashMap<String, InMemoryQueue>,
    open_connections: HashSet<u64>,
    next_connection_id: u64,
    connect_attempts: u64,
    refuse_next: u32,
    unreachable: bool,
}

impl BrokerInner {
    fn close_connection(&mut self, connection_id: u64) -> bool {
        if !self.open_connections.remove(&connection_id) {
            return false;
        }
        for queue in self.queues.values_mut() {
            queue.requeue_connection(connection_id);
        }
        true
    }
}

#[derive(Debug, Default)]
struct Shared {
    inner: Mutex<BrokerInner>,
    /// Woken whenever a queue gains a ready message or a connection closes
    changed: Notify,
}

/// In-memory broker for testing
///
/// ```rust
/// use pingwatch::messaging::providers::InMemoryBroker;
/// use pingwatch::messaging::{ChannelConnection, ChannelConnector};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let broker = InMemoryBroker::new();
/// let connection = broker.connect("memory://local").await?;
/// connection.declare_queue("ping_results").await?;
/// connection.publish("ping_results", br#"{"ip":"10.0.0.2"}"#).await?;
/// assert_eq!(broker.ready_count("ping_results"), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every open connection as a network failure would. Unacked
    /// deliveries become ready again and open consumers yield an error.
    pub fn sever_connections(&self) -> usize {
        let severed = {
            let mut inner = self.shared.inner.lock();
            let ids: Vec<u64> = inner.open_connections.iter().copied().collect();
            for id in &ids {
                inner.close_connection(*id);
            }
            ids.len()
        };
        debug!(severed, "Severed in-memory broker connections");
        self.shared.changed.notify_waiters();
        severed
    }

    /// Refuse the next `count` connection attempts
    pub fn fail_next_connects(&self, count: u32) {
        self.shared.inner.lock().refuse_next = count;
    }

    /// Refuse every connection attempt until reset
    pub fn set_unreachable(&self, unreachable: bool) {
        self.shared.inner.lock().unreachable = unreachable;
    }

    pub fn connect_attempts(&self) -> u64 {
        self.shared.inner.lock().connect_attempts
    }

    pub fn open_connections(&self) -> usize {
        self.shared.inner.lock().open_connections.len()
    }

    pub fn queue_exists(&self, queue_name: &str) -> bool {
        self.shared.inner.lock().queues.contains_key(queue_name)
    }

    /// Messages waiting for delivery
    pub fn ready_count(&self, queue_name: &str) -> usize {
        self.shared
            .inner
            .lock()
            .queues
            .get(queue_name)
            .map(|q| q.ready.len())
            .unwrap_or(0)
    }

    /// Messages delivered but not yet settled
    pub fn unacked_count(&self, queue_name: &str) -> usize {
        self.shared
            .inner
            .lock()
            .queues
            .get(queue_name)
            .map(|q| q.unacked.len())
            .unwrap_or(0)
    }

    /// Payloads waiting for delivery, head first
    pub fn ready_payloads(&self, queue_name: &str) -> Vec<Vec<u8>> {
        self.shared
            .inner
            .lock()
            .queues
            .get(queue_name)
            .map(|q| q.ready.iter().map(|m| m.payload.clone()).collect())
            .unwrap_or_default()
    }

    pub fn stats(&self, queue_name: &str) -> Option<InMemoryQueueStats> {
        self.shared
            .inner
            .lock()
            .queues
            .get(queue_name)
            .map(|q| q.stats)
    }
}

#[async_trait]
impl ChannelConnector for InMemoryBroker {
    async fn connect(&self, _url: &str) -> MessagingResult<Box<dyn ChannelConnection>> {
        let connection_id = {
            let mut inner = self.shared.inner.lock();
            inner.connect_attempts += 1;

            if inner.unreachable {
                return Err(MessagingError::connection("in-memory broker is unreachable"));
            }
            if inner.refuse_next > 0 {
                inner.refuse_next -= 1;
                return Err(MessagingError::connection("in-memory broker refused connection"));
            }

            inner.next_connection_id += 1;
            let id = inner.next_connection_id;
            inner.open_connections.insert(id);
            id
        };

        Ok(Box::new(InMemoryConnection {
            connection_id,
            shared: Arc::clone(&self.shared),
            prefetch: Arc::new(AtomicU16::new(0)),
        }))
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

/// One open connection to the in-memory broker. Dropping it closes it.
#[derive(Debug)]
pub struct InMemoryConnection {
    connection_id: u64,
    shared: Arc<Shared>,
    prefetch: Arc<AtomicU16>,
}

impl InMemoryConnection {
    fn ensure_open(&self, queue_name: &str) -> MessagingResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(MessagingError::not_connected(queue_name))
        }
    }

    fn shutdown(&self) {
        let closed = self.shared.inner.lock().close_connection(self.connection_id);
        if closed {
            self.shared.changed.notify_waiters();
        }
    }
}

impl Drop for InMemoryConnection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[async_trait]
impl ChannelConnection for InMemoryConnection {
    fn is_connected(&self) -> bool {
        self.shared
            .inner
            .lock()
            .open_connections
            .contains(&self.connection_id)
    }

    async fn declare_queue(&self, queue_name: &str) -> MessagingResult<()> {
        self.ensure_open(queue_name)?;
        self.shared
            .inner
            .lock()
            .queues
            .entry(queue_name.to_string())
            .or_default();
        Ok(())
    }

    async fn publish(&self, queue_name: &str, payload: &[u8]) -> MessagingResult<()> {
        {
            let mut inner = self.shared.inner.lock();
            if !inner.open_connections.contains(&self.connection_id) {
                return Err(MessagingError::not_connected(queue_name));
            }
            let queue = inner
                .queues
                .get_mut(queue_name)
                .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;
            queue.ready.push_back(StoredMessage {
                payload: payload.to_vec(),
                redelivered: false,
            });
            queue.stats.published += 1;
        }
        self.shared.changed.notify_waiters();
        Ok(())
    }

    async fn set_prefetch(&self, count: u16) -> MessagingResult<()> {
        self.prefetch.store(count, Ordering::Relaxed);
        Ok(())
    }

    async fn consume(&self, queue_name: &str, consumer_tag: &str) -> MessagingResult<MessageStream> {
        self.ensure_open(queue_name)?;
        if !self.shared.inner.lock().queues.contains_key(queue_name) {
            return Err(MessagingError::queue_not_found(queue_name));
        }
        debug!(queue = queue_name, consumer_tag, "In-memory consumer started");

        let cursor = ConsumerCursor {
            connection_id: self.connection_id,
            queue_name: queue_name.to_string(),
            shared: Arc::clone(&self.shared),
            prefetch: Arc::clone(&self.prefetch),
        };

        let stream = futures::stream::unfold(Some(cursor), |cursor| async move {
            let cursor = cursor?;
            match cursor.next_delivery().await {
                Ok(message) => Some((Ok(message), Some(cursor))),
                Err(e) => Some((Err(e), None)),
            }
        });

        Ok(Box::pin(stream))
    }

    async fn close(&self) -> MessagingResult<()> {
        self.shutdown();
        Ok(())
    }
}

struct ConsumerCursor {
    connection_id: u64,
    queue_name: String,
    shared: Arc<Shared>,
    prefetch: Arc<AtomicU16>,
}

impl ConsumerCursor {
    /// Wait for the next ready message this consumer is allowed to take
    async fn next_delivery(&self) -> MessagingResult<ChannelMessage> {
        loop {
            let notified = self.shared.changed.notified();
            tokio::pin!(notified);
            // Register before inspecting state so a publish between the check
            // and the await still wakes us.
            notified.as_mut().enable();

            if let Some(result) = self.try_take() {
                return result;
            }

            notified.await;
        }
    }

    fn try_take(&self) -> Option<MessagingResult<ChannelMessage>> {
        let mut inner = self.shared.inner.lock();
        if !inner.open_connections.contains(&self.connection_id) {
            return Some(Err(MessagingError::connection(format!(
                "consumer connection closed (queue {})",
                self.queue_name
            ))));
        }

        let Some(queue) = inner.queues.get_mut(&self.queue_name) else {
            return Some(Err(MessagingError::queue_not_found(&self.queue_name)));
        };

        let prefetch = self.prefetch.load(Ordering::Relaxed) as usize;
        if prefetch > 0 && queue.in_flight(self.connection_id) >= prefetch {
            return None;
        }

        let stored = queue.ready.pop_front()?;
        queue.next_tag += 1;
        let delivery_tag = queue.next_tag;
        queue.stats.delivered += 1;
        queue.unacked.insert(
            delivery_tag,
            Unacked {
                connection_id: self.connection_id,
                message: stored.clone(),
            },
        );

        let acker = InMemoryAcker {
            connection_id: self.connection_id,
            queue_name: self.queue_name.clone(),
            shared: Arc::clone(&self.shared),
        };

        Some(Ok(ChannelMessage::new(
            stored.payload,
            delivery_tag,
            stored.redelivered,
            Box::new(acker),
        )))
    }
}

struct InMemoryAcker {
    connection_id: u64,
    queue_name: String,
    shared: Arc<Shared>,
}

impl InMemoryAcker {
    fn settle(&self, delivery_tag: u64) -> MessagingResult<StoredMessage> {
        let mut inner = self.shared.inner.lock();
        if !inner.open_connections.contains(&self.connection_id) {
            return Err(MessagingError::not_connected(&self.queue_name));
        }

        let queue = inner
            .queues
            .get_mut(&self.queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(&self.queue_name))?;

        match queue.unacked.get(&delivery_tag) {
            Some(u) if u.connection_id == self.connection_id => {}
            _ => return Err(MessagingError::unknown_delivery(&self.queue_name, delivery_tag)),
        }

        queue
            .unacked
            .remove(&delivery_tag)
            .map(|u| u.message)
            .ok_or_else(|| MessagingError::unknown_delivery(&self.queue_name, delivery_tag))
    }
}

#[async_trait]
impl DeliveryAcker for InMemoryAcker {
    async fn ack(&self, delivery_tag: u64) -> MessagingResult<()> {
        self.settle(delivery_tag)?;
        if let Some(queue) = self.shared.inner.lock().queues.get_mut(&self.queue_name) {
            queue.stats.acked += 1;
        }
        // A freed prefetch slot may unblock the consumer
        self.shared.changed.notify_waiters();
        Ok(())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> MessagingResult<()> {
        let message = self.settle(delivery_tag)?;
        {
            let mut inner = self.shared.inner.lock();
            if let Some(queue) = inner.queues.get_mut(&self.queue_name) {
                queue.stats.nacked += 1;
                if requeue {
                    queue.ready.push_front(StoredMessage {
                        redelivered: true,
                        ..message
                    });
                    queue.stats.redelivered += 1;
                }
            }
        }
        self.shared.changed.notify_waiters();
        Ok(())
    }
}
