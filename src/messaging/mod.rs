//! # Durable Channel Messaging
//!
//! Client for the durable queue that carries probe results from the
//! producer to the ingest process.
//!
//! ## Architecture
//!
//! ```text
//! ChannelConnector (trait)          <- dials the broker
//!   ├── RabbitMqConnector           (lapin, AMQP 0.9.1)
//!   └── InMemoryBroker              (tests, local runs)
//!
//! ChannelConnection (trait)         <- declare / publish / consume / close
//!
//! ChannelPublisher                  <- producer side, lazy reconnect on publish
//! ChannelConsumer                   <- consumer side, explicit-ack streams
//! ```
//!
//! ## Delivery semantics
//!
//! At-least-once. Deliveries stay in the broker's unacked set until settled
//! through [`ChannelMessage::ack`] or [`ChannelMessage::nack`]; both consume
//! the message, so a delivery is settled at most once.

mod connection;
mod consumer;
mod errors;
pub mod providers;
mod publisher;
mod traits;
mod types;

pub use connection::connect_with_retry;
pub use consumer::ChannelConsumer;
pub use errors::{MessagingError, MessagingResult};
pub use publisher::{ChannelPublisher, PublisherStats};
pub use traits::{ChannelConnection, ChannelConnector, DeliveryAcker, QueueMessage, ResultPublisher};
pub use types::{ChannelMessage, MessageStream, RetryPolicy};
