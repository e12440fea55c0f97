//! Shared fakes for the integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use pingwatch::discovery::{DiscoveryError, TargetDirectory};
use pingwatch::messaging::{MessagingError, MessagingResult, ResultPublisher};
use pingwatch::models::{ProbeResult, ProbeTarget};
use pingwatch::persistence::{PersistenceError, PersistenceSink};
use pingwatch::probe::Prober;

pub const QUEUE: &str = "ping_results";

pub fn target(id: &str, address: &str) -> ProbeTarget {
    ProbeTarget::new(id, address)
}

/// Always returns the same targets
pub struct FixedDirectory {
    targets: Vec<ProbeTarget>,
    pub calls: AtomicUsize,
}

impl FixedDirectory {
    pub fn new(targets: Vec<ProbeTarget>) -> Self {
        Self {
            targets,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TargetDirectory for FixedDirectory {
    async fn list_targets(&self) -> Result<Vec<ProbeTarget>, DiscoveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.targets.clone())
    }
}

pub struct FailingDirectory;

#[async_trait]
impl TargetDirectory for FailingDirectory {
    async fn list_targets(&self) -> Result<Vec<ProbeTarget>, DiscoveryError> {
        Err(DiscoveryError::command_failed("docker ps -q", "Cannot connect to the Docker daemon"))
    }
}

/// Answers from a fixed set of unreachable addresses, recording every call
#[derive(Default)]
pub struct ScriptedProber {
    unreachable: HashSet<String>,
    delay: Duration,
    pub probed: Mutex<Vec<String>>,
}

impl ScriptedProber {
    pub fn all_up() -> Self {
        Self::default()
    }

    pub fn down(addresses: &[&str]) -> Self {
        Self {
            unreachable: addresses.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn probe_count(&self) -> usize {
        self.probed.lock().len()
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, target: &ProbeTarget, _timeout: Duration) -> ProbeResult {
        self.probed.lock().push(target.address.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.unreachable.contains(&target.address) {
            ProbeResult::unreachable(target, Duration::from_millis(1000))
        } else {
            ProbeResult::reachable(target, Duration::from_millis(3))
        }
    }
}

/// Collects published results; can be told to reject some addresses
#[derive(Default)]
pub struct RecordingPublisher {
    pub published: Mutex<Vec<ProbeResult>>,
    rejected: HashSet<String>,
}

impl RecordingPublisher {
    pub fn rejecting(addresses: &[&str]) -> Self {
        Self {
            rejected: addresses.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<_> = self
            .published
            .lock()
            .iter()
            .map(|r| r.address.clone())
            .collect();
        addresses.sort();
        addresses
    }
}

#[async_trait]
impl ResultPublisher for RecordingPublisher {
    async fn publish(&self, result: &ProbeResult) -> MessagingResult<()> {
        if self.rejected.contains(&result.address) {
            return Err(MessagingError::not_connected(QUEUE));
        }
        self.published.lock().push(result.clone());
        Ok(())
    }
}

/// In-memory sink that can be told to fail a number of saves first
#[derive(Default)]
pub struct RecordingSink {
    pub saved: Mutex<Vec<ProbeResult>>,
    failures_left: AtomicUsize,
    pub attempts: AtomicUsize,
}

impl RecordingSink {
    pub fn failing_first(count: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(count),
            ..Default::default()
        }
    }

    pub fn saved(&self) -> Vec<ProbeResult> {
        self.saved.lock().clone()
    }
}

#[async_trait]
impl PersistenceSink for RecordingSink {
    async fn save(&self, result: &ProbeResult) -> Result<(), PersistenceError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(PersistenceError::write(&result.address, "connection reset by peer"));
        }
        self.saved.lock().push(result.clone());
        Ok(())
    }
}

/// Sink whose every save fails
pub struct FailingSink;

#[async_trait]
impl PersistenceSink for FailingSink {
    async fn save(&self, result: &ProbeResult) -> Result<(), PersistenceError> {
        Err(PersistenceError::write(&result.address, "relation \"containers\" does not exist"))
    }
}

/// Poll `check` until it holds or `within` elapses
pub async fn eventually<F>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
