//! # Probe Target
//!
//! An addressable container produced by the target directory once per cycle.

use serde::{Deserialize, Serialize};

/// A single container to probe
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProbeTarget {
    /// Stable identifier from the discovery source (container id or configured name)
    pub id: String,
    /// Network address handed to the prober
    pub address: String,
}

impl ProbeTarget {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
        }
    }

    /// Short form of the id for log lines (docker ids are 64 hex chars)
    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(12)
            .map(|(idx, _)| idx)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }
}

impl std::fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.short_id(), self.address)
    }
}
