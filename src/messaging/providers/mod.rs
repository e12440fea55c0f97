//! # Channel Providers
//!
//! - [`RabbitMqConnector`] - RabbitMQ via the lapin crate
//! - [`InMemoryBroker`] - process-local broker for tests and local runs

mod in_memory;
mod rabbitmq;

pub use in_memory::{InMemoryBroker, InMemoryConnection, InMemoryQueueStats};
pub use rabbitmq::{RabbitMqConnection, RabbitMqConnector};
