//! # System Constants
//!
//! Defaults shared by both halves of the pipeline. Every value here can be
//! overridden through configuration except the wire-level names.

use std::time::Duration;

/// Durable queue carrying serialized probe results
pub const DEFAULT_QUEUE_NAME: &str = "ping_results";

/// Content type stamped on every published message
pub const MESSAGE_CONTENT_TYPE: &str = "application/json";

/// AMQP persistent delivery mode
pub const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// Startup connection attempts before giving up
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 10;

/// Constant delay between startup connection attempts
pub const DEFAULT_CONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// Upper bound for a single reachability check
pub const MAX_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Grace added on top of the probe timeout before the child process is killed
pub const PROBE_TIMEOUT_GRACE: Duration = Duration::from_millis(250);

/// Probes allowed in flight within one cycle
pub const DEFAULT_PROBE_CONCURRENCY: usize = 16;

/// How long the coordinator waits for loops to quiesce
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection pool size for the persistence sink
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

/// Time allowed to acquire a database connection at startup
pub const DB_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// AMQP reply code used when closing channels and connections
pub const AMQP_REPLY_SUCCESS: u16 = 200;

/// Upper bound for one container-runtime discovery command
pub const DISCOVERY_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause before returning a result whose write failed to the queue
pub const DEFAULT_REQUEUE_DELAY: Duration = Duration::from_secs(1);
