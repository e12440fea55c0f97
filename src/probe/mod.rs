//! # Prober
//!
//! One bounded reachability check per call. An unreachable target is a
//! normal outcome, reported as `reachable = false` with the elapsed time,
//! never as an error.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::constants::{MAX_PROBE_TIMEOUT, PROBE_TIMEOUT_GRACE};
use crate::models::{ProbeResult, ProbeTarget};

#[async_trait]
pub trait Prober: Send + Sync {
    /// Check `target` once. Must return within `timeout` plus a small grace.
    async fn probe(&self, target: &ProbeTarget, timeout: Duration) -> ProbeResult;
}

/// ICMP echo through the system `ping` binary (`ping -c 1 -W <secs>`)
#[derive(Debug, Clone)]
pub struct PingProber {
    program: String,
}

impl Default for PingProber {
    fn default() -> Self {
        Self::new()
    }
}

impl PingProber {
    pub fn new() -> Self {
        Self {
            program: "ping".to_string(),
        }
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

/// `ping` takes whole seconds for `-W`; the outer timeout enforces the
/// sub-second bound.
pub fn ping_args(address: &str, probe_timeout: Duration) -> Vec<String> {
    let wait_secs = probe_timeout.as_secs_f64().ceil().max(1.0) as u64;
    vec![
        "-c".to_string(),
        "1".to_string(),
        "-W".to_string(),
        wait_secs.to_string(),
        address.to_string(),
    ]
}

#[async_trait]
impl Prober for PingProber {
    async fn probe(&self, target: &ProbeTarget, probe_timeout: Duration) -> ProbeResult {
        let probe_timeout = probe_timeout.min(MAX_PROBE_TIMEOUT);
        let started = Instant::now();

        let mut cmd = Command::new(&self.program);
        cmd.args(ping_args(&target.address, probe_timeout))
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        let reachable = match timeout(probe_timeout + PROBE_TIMEOUT_GRACE, cmd.status()).await {
            Ok(Ok(status)) => {
                trace!(address = %target.address, %status, "ping exited");
                status.success()
            }
            Ok(Err(e)) => {
                debug!(address = %target.address, error = %e, "ping could not be started");
                false
            }
            Err(_) => {
                debug!(address = %target.address, "ping timed out");
                false
            }
        };

        let elapsed = started.elapsed();
        if reachable {
            ProbeResult::reachable(target, elapsed)
        } else {
            ProbeResult::unreachable(target, elapsed)
        }
    }
}
