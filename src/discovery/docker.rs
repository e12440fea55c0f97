//! Container discovery through the docker CLI.
//!
//! Two calls per cycle: `docker ps -q --no-trunc` for running container
//! ids, then one `docker inspect` over all of them. A container without an
//! address on any network is skipped.

use std::collections::BTreeMap;
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{DiscoveryError, TargetDirectory};
use crate::constants::DISCOVERY_COMMAND_TIMEOUT;
use crate::models::ProbeTarget;

#[derive(Debug, Deserialize)]
struct InspectedContainer {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "NetworkSettings", default)]
    network_settings: Option<NetworkSettings>,
}

#[derive(Debug, Deserialize)]
struct NetworkSettings {
    /// Ordered by network name so the chosen address is stable
    #[serde(rename = "Networks", default)]
    networks: Option<BTreeMap<String, Network>>,
}

#[derive(Debug, Deserialize)]
struct Network {
    #[serde(rename = "IPAddress", default)]
    ip_address: Option<String>,
}

impl InspectedContainer {
    fn first_address(&self) -> Option<(&str, &str)> {
        self.network_settings
            .as_ref()?
            .networks
            .as_ref()?
            .iter()
            .find_map(|(name, network)| {
                network
                    .ip_address
                    .as_deref()
                    .filter(|ip| !ip.is_empty())
                    .map(|ip| (name.as_str(), ip))
            })
    }
}

/// Turn `docker inspect` JSON into targets, skipping containers without an
/// address.
pub fn parse_inspect_output(json: &[u8]) -> Result<Vec<ProbeTarget>, DiscoveryError> {
    let containers: Vec<InspectedContainer> = serde_json::from_slice(json)
        .map_err(|e| DiscoveryError::malformed(format!("docker inspect: {e}")))?;

    let targets = containers
        .iter()
        .filter_map(|container| match container.first_address() {
            Some((network, ip)) => {
                debug!(container = %container.id, network, ip, "Discovered container");
                Some(ProbeTarget::new(container.id.clone(), ip))
            }
            None => {
                warn!(container = %container.id, "Container has no IP address in any network");
                None
            }
        })
        .collect();

    Ok(targets)
}

/// Lists running containers of the local Docker engine
#[derive(Debug, Clone)]
pub struct DockerTargetDirectory {
    program: String,
    command_timeout: Duration,
}

impl Default for DockerTargetDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerTargetDirectory {
    pub fn new() -> Self {
        Self {
            program: "docker".to_string(),
            command_timeout: DISCOVERY_COMMAND_TIMEOUT,
        }
    }

    /// Use a different CLI binary (e.g. `podman`)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    async fn run(&self, args: &[&str]) -> Result<Output, DiscoveryError> {
        let command = format!("{} {}", self.program, args.first().copied().unwrap_or_default());

        let mut cmd = Command::new(&self.program);
        cmd.args(args).kill_on_drop(true);

        match timeout(self.command_timeout, cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(DiscoveryError::command_failed(command, e.to_string())),
            Err(_) => Err(DiscoveryError::Timeout {
                command,
                timeout_ms: self.command_timeout.as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl TargetDirectory for DockerTargetDirectory {
    async fn list_targets(&self) -> Result<Vec<ProbeTarget>, DiscoveryError> {
        let ps = self.run(&["ps", "-q", "--no-trunc"]).await?;
        if !ps.status.success() {
            return Err(DiscoveryError::command_failed(
                format!("{} ps", self.program),
                String::from_utf8_lossy(&ps.stderr).trim(),
            ));
        }

        let ids: Vec<&str> = std::str::from_utf8(&ps.stdout)
            .map_err(|e| DiscoveryError::malformed(format!("docker ps: {e}")))?
            .lines()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .collect();

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut args = vec!["inspect"];
        args.extend(ids.iter().copied());
        let inspect = self.run(&args).await?;

        // A container that stopped between the two calls makes inspect exit
        // non-zero while still printing the others.
        if !inspect.status.success() {
            let stderr = String::from_utf8_lossy(&inspect.stderr);
            if inspect.stdout.iter().all(u8::is_ascii_whitespace) {
                return Err(DiscoveryError::command_failed(
                    format!("{} inspect", self.program),
                    stderr.trim(),
                ));
            }
            warn!(stderr = %stderr.trim(), "docker inspect reported errors for some containers");
        }

        parse_inspect_output(&inspect.stdout)
    }
}
