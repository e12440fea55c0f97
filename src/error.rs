//! # Error Types
//!
//! Crate-level error umbrella. Each layer owns a structured `thiserror`
//! enum; `PingwatchError` lets binaries and bootstrap code propagate any of
//! them with `?`.

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::discovery::DiscoveryError;
use crate::messaging::MessagingError;
use crate::persistence::PersistenceError;

#[derive(Debug, Error)]
pub enum PingwatchError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl PingwatchError {
    /// Whether retrying the same startup would fail the same way: bad
    /// configuration or an exhausted connection budget
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::Messaging(MessagingError::ConnectRetriesExhausted { .. })
                | Self::Persistence(PersistenceError::Connection { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, PingwatchError>;
