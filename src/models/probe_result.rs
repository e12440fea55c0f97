//! # Probe Result
//!
//! Outcome of one reachability check. This is the payload of every message
//! on the durable queue.
//!
//! ## Wire format
//!
//! ```json
//! {"ip": "10.0.0.2", "ping_time": 0.0123, "last_success": "2024-05-01T12:00:00Z", "status": true}
//! ```
//!
//! `status` carries the reachability flag end to end. Producers that predate
//! the flag omit it; those messages decode as reachable, which is what the
//! consumer historically assumed for every delivered result.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ProbeTarget;

fn legacy_reachable() -> bool {
    true
}

/// Latency measurement and reachability flag for one address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    #[serde(rename = "ip")]
    pub address: String,

    /// Wall time spent on the check, in seconds
    #[serde(rename = "ping_time")]
    pub latency_seconds: f64,

    /// When the check completed
    #[serde(rename = "last_success")]
    pub observed_at: DateTime<Utc>,

    #[serde(rename = "status", default = "legacy_reachable")]
    pub reachable: bool,
}

impl ProbeResult {
    pub fn new(
        address: impl Into<String>,
        latency: Duration,
        observed_at: DateTime<Utc>,
        reachable: bool,
    ) -> Self {
        Self {
            address: address.into(),
            latency_seconds: latency.as_secs_f64(),
            observed_at,
            reachable,
        }
    }

    pub fn reachable(target: &ProbeTarget, latency: Duration) -> Self {
        Self::new(target.address.clone(), latency, Utc::now(), true)
    }

    pub fn unreachable(target: &ProbeTarget, elapsed: Duration) -> Self {
        Self::new(target.address.clone(), elapsed, Utc::now(), false)
    }

    pub fn latency(&self) -> Duration {
        Duration::try_from_secs_f64(self.latency_seconds).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_field_names() {
        let observed_at = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let result = ProbeResult::new("10.0.0.2", Duration::from_millis(10), observed_at, true);

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["ip"], "10.0.0.2");
        assert_eq!(value["ping_time"], 0.01);
        assert_eq!(value["last_success"], "2024-05-01T12:00:00Z");
        assert_eq!(value["status"], true);
    }

    #[test]
    fn test_unreachable_flag_survives_serialization() {
        let target = ProbeTarget::new("b", "10.0.0.3");
        let result = ProbeResult::unreachable(&target, Duration::from_secs(1));

        let bytes = serde_json::to_vec(&result).unwrap();
        let decoded: ProbeResult = serde_json::from_slice(&bytes).unwrap();

        assert!(!decoded.reachable);
        assert_eq!(decoded, result);
    }

    #[test]
    fn test_legacy_payload_without_status_decodes_as_reachable() {
        let payload = json!({
            "ip": "172.17.0.4",
            "ping_time": 0.0021,
            "last_success": "2024-05-01T12:00:00.123456789Z"
        });

        let decoded: ProbeResult = serde_json::from_value(payload).unwrap();
        assert!(decoded.reachable);
        assert_eq!(decoded.address, "172.17.0.4");
        assert_eq!(decoded.latency(), Duration::from_secs_f64(0.0021));
    }

    #[test]
    fn test_negative_latency_clamps_to_zero() {
        let mut result = ProbeResult::reachable(&ProbeTarget::new("a", "10.0.0.2"), Duration::ZERO);
        result.latency_seconds = -1.0;
        assert_eq!(result.latency(), Duration::ZERO);
    }
}
