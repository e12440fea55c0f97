#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, RabbitMQ in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Pingwatch
//!
//! Container reachability telemetry in two processes joined by a durable
//! queue.
//!
//! ```text
//! pinger:  TargetDirectory ─► Prober ─► ChannelPublisher ─► [ping_results]
//! ingest:  [ping_results] ─► ChannelConsumer ─► IngestLoop ─► PersistenceSink
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Per-process configuration read from the environment
//! - [`discovery`] - Target directories (static list, container runtime)
//! - [`probe`] - Reachability checks
//! - [`scheduler`] - Periodic probe cycles
//! - [`messaging`] - Broker abstraction, RabbitMQ and in-memory providers
//! - [`ingest`] - Consume, persist, acknowledge
//! - [`persistence`] - PostgreSQL result sink
//! - [`shutdown`] - Signal handling and supervised task shutdown
//! - [`logging`] - Tracing subscriber setup
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use pingwatch::config::ConnectionUrl;
//! use pingwatch::messaging::providers::InMemoryBroker;
//! use pingwatch::messaging::{ChannelPublisher, RetryPolicy};
//! use pingwatch::models::{ProbeResult, ProbeTarget};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let broker = InMemoryBroker::new();
//! let publisher = ChannelPublisher::new(
//!     Arc::new(broker.clone()),
//!     ConnectionUrl::new("memory://local"),
//!     "ping_results",
//! );
//! publisher.connect(RetryPolicy::once()).await.unwrap();
//!
//! let target = ProbeTarget::new("web", "10.0.0.2");
//! publisher
//!     .publish_result(&ProbeResult::reachable(&target, Duration::from_millis(3)))
//!     .await
//!     .unwrap();
//! assert_eq!(broker.ready_count("ping_results"), 1);
//! # });
//! ```

pub mod config;
pub mod constants;
pub mod discovery;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod persistence;
pub mod probe;
pub mod scheduler;
pub mod shutdown;

pub use config::{IngestConfig, PingerConfig};
pub use error::{PingwatchError, Result};
pub use ingest::{AckMode, IngestExit, IngestLoop, IngestReport};
pub use models::{ProbeResult, ProbeTarget};
pub use scheduler::{CycleReport, ProbeScheduler, SchedulerSettings};
pub use shutdown::{ShutdownCoordinator, ShutdownReport};
