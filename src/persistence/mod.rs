//! # Persistence Sink
//!
//! Terminal stage of the ingest pipeline. The sink stores one probe result
//! per call; retries and acknowledgment are the ingest loop's concern.

mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::ProbeResult;

pub use postgres::PostgresSink;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Persistence store unreachable: {message}")]
    Connection { message: String },

    #[error("Failed to save result for {address}: {message}")]
    Write { address: String, message: String },

    #[error("Persistence sink is closed")]
    Closed,
}

impl PersistenceError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn write(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Write {
            address: address.into(),
            message: message.into(),
        }
    }
}

/// Stores probe results. Implementations must tolerate sequential calls from
/// a single ingest loop; concurrent use is their own concern.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn save(&self, result: &ProbeResult) -> Result<(), PersistenceError>;
}
