//! # Target Directory
//!
//! Supplies the set of addresses to probe, once per cycle.
//!
//! - [`StaticTargetDirectory`]: a fixed list from configuration
//! - [`DockerTargetDirectory`]: running containers on the local Docker engine

mod docker;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::ProbeTarget;

pub use docker::{parse_inspect_output, DockerTargetDirectory};

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Discovery command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("Discovery command '{command}' timed out after {timeout_ms}ms")]
    Timeout { command: String, timeout_ms: u64 },

    #[error("Malformed discovery output: {message}")]
    MalformedOutput { message: String },

    #[error("Invalid target entry '{entry}': {reason}")]
    InvalidTarget { entry: String, reason: String },
}

impl DiscoveryError {
    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedOutput {
            message: message.into(),
        }
    }

    pub fn invalid_target(entry: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTarget {
            entry: entry.into(),
            reason: reason.into(),
        }
    }
}

/// Source of probe targets. Called once per cycle; order of the returned
/// targets carries no meaning.
#[async_trait]
pub trait TargetDirectory: Send + Sync {
    async fn list_targets(&self) -> Result<Vec<ProbeTarget>, DiscoveryError>;
}

/// Parse `id=address` entries separated by commas. An entry without `=` uses
/// the address as its id.
pub fn parse_target_list(raw: &str) -> Result<Vec<ProbeTarget>, DiscoveryError> {
    let mut targets = Vec::new();

    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (id, address) = match entry.split_once('=') {
            Some((id, address)) => (id.trim(), address.trim()),
            None => (entry, entry),
        };

        if id.is_empty() {
            return Err(DiscoveryError::invalid_target(entry, "empty id"));
        }
        if address.is_empty() || address.contains(char::is_whitespace) {
            return Err(DiscoveryError::invalid_target(entry, "missing or malformed address"));
        }

        targets.push(ProbeTarget::new(id, address));
    }

    if targets.is_empty() {
        return Err(DiscoveryError::invalid_target(raw, "no targets listed"));
    }
    Ok(targets)
}

/// Fixed target list
#[derive(Debug, Clone)]
pub struct StaticTargetDirectory {
    targets: Vec<ProbeTarget>,
}

impl StaticTargetDirectory {
    pub fn new(targets: Vec<ProbeTarget>) -> Self {
        Self { targets }
    }
}

#[async_trait]
impl TargetDirectory for StaticTargetDirectory {
    async fn list_targets(&self) -> Result<Vec<ProbeTarget>, DiscoveryError> {
        Ok(self.targets.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_list() {
        let targets = parse_target_list(" a=10.0.0.2 ,b = 10.0.0.3,,10.0.0.4").unwrap();
        assert_eq!(
            targets,
            vec![
                ProbeTarget::new("a", "10.0.0.2"),
                ProbeTarget::new("b", "10.0.0.3"),
                ProbeTarget::new("10.0.0.4", "10.0.0.4"),
            ]
        );
    }

    #[test]
    fn test_parse_target_list_rejects_bad_entries() {
        assert!(matches!(
            parse_target_list("=10.0.0.2"),
            Err(DiscoveryError::InvalidTarget { .. })
        ));
        assert!(matches!(
            parse_target_list("a="),
            Err(DiscoveryError::InvalidTarget { .. })
        ));
        assert!(matches!(
            parse_target_list(" , "),
            Err(DiscoveryError::InvalidTarget { .. })
        ));
    }

    #[tokio::test]
    async fn test_static_directory_lists_every_target() {
        let targets = parse_target_list("a=10.0.0.2,b=10.0.0.3").unwrap();
        let directory = StaticTargetDirectory::new(targets);
        let targets = directory.list_targets().await.unwrap();
        assert_eq!(targets.len(), 2);
    }
}
