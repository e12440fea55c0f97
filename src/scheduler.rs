//! # Probe Scheduler
//!
//! Drives periodic probe cycles: on every tick, list targets, probe each one
//! and publish every result.
//!
//! ```text
//! Idle ──tick──► Ticking ──cycle done──► Idle
//!   │                │
//!   └──cancel──► Stopped ◄──cancel seen before next publish (cycle abandoned)
//! ```
//!
//! Probes within a cycle run concurrently up to the configured limit.
//! Publishing stays on the scheduler task, one result at a time, so the
//! publisher connection is never used by two tasks at once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::PingerConfig;
use crate::discovery::TargetDirectory;
use crate::messaging::ResultPublisher;
use crate::probe::Prober;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub probe_timeout: Duration,
    pub probe_concurrency: usize,
}

impl From<&PingerConfig> for SchedulerSettings {
    fn from(config: &PingerConfig) -> Self {
        Self {
            interval: config.interval,
            probe_timeout: config.probe_timeout,
            probe_concurrency: config.probe_concurrency,
        }
    }
}

/// What one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub targets: usize,
    pub probed: usize,
    pub published: usize,
    pub publish_failures: usize,
    /// Target listing failed; nothing was probed
    pub skipped: bool,
    /// Cancellation arrived mid-cycle; remaining results were not published
    pub abandoned: bool,
}

/// Cumulative counters across cycles
#[derive(Debug, Default)]
pub struct SchedulerStats {
    cycles: AtomicU64,
    skipped_cycles: AtomicU64,
    probes: AtomicU64,
    published: AtomicU64,
    publish_failures: AtomicU64,
}

/// Point-in-time copy of [`SchedulerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStatsSnapshot {
    pub cycles: u64,
    pub skipped_cycles: u64,
    pub probes: u64,
    pub published: u64,
    pub publish_failures: u64,
}

impl SchedulerStats {
    fn record(&self, report: &CycleReport) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        if report.skipped {
            self.skipped_cycles.fetch_add(1, Ordering::Relaxed);
        }
        self.probes.fetch_add(report.probed as u64, Ordering::Relaxed);
        self.published
            .fetch_add(report.published as u64, Ordering::Relaxed);
        self.publish_failures
            .fetch_add(report.publish_failures as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SchedulerStatsSnapshot {
        SchedulerStatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            skipped_cycles: self.skipped_cycles.load(Ordering::Relaxed),
            probes: self.probes.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }
}

pub struct ProbeScheduler {
    directory: Arc<dyn TargetDirectory>,
    prober: Arc<dyn Prober>,
    publisher: Arc<dyn ResultPublisher>,
    settings: SchedulerSettings,
    stats: Arc<SchedulerStats>,
}

impl ProbeScheduler {
    pub fn new(
        directory: Arc<dyn TargetDirectory>,
        prober: Arc<dyn Prober>,
        publisher: Arc<dyn ResultPublisher>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            directory,
            prober,
            publisher,
            settings,
            stats: Arc::new(SchedulerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<SchedulerStats> {
        Arc::clone(&self.stats)
    }

    /// Tick until `cancel` fires. The first cycle starts one interval after
    /// the call; a cycle that overruns delays the next tick instead of
    /// bursting to catch up.
    pub async fn run(&self, cancel: CancellationToken) -> SchedulerStatsSnapshot {
        let period = self.settings.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_ms = period.as_millis() as u64,
            probe_timeout_ms = self.settings.probe_timeout.as_millis() as u64,
            concurrency = self.settings.probe_concurrency,
            "Probe scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_cycle(&cancel).await;
                }
            }
        }

        let stats = self.stats.snapshot();
        info!(
            cycles = stats.cycles,
            published = stats.published,
            publish_failures = stats.publish_failures,
            "Probe scheduler stopped"
        );
        stats
    }

    /// One full cycle: list, probe, publish
    #[instrument(skip_all)]
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        let targets = match self.directory.list_targets().await {
            Ok(targets) => targets,
            Err(e) => {
                warn!(error = %e, "Failed to list targets; skipping cycle");
                let report = CycleReport {
                    skipped: true,
                    ..Default::default()
                };
                self.stats.record(&report);
                return report;
            }
        };

        let mut report = CycleReport {
            targets: targets.len(),
            ..Default::default()
        };
        debug!(targets = report.targets, "Starting probe cycle");

        // Owned targets and prober handles keep the cycle future `Send`
        let probe_timeout = self.settings.probe_timeout;
        let mut results = futures::stream::iter(targets)
            .map(|target| {
                let prober = Arc::clone(&self.prober);
                async move { prober.probe(&target, probe_timeout).await }
            })
            .buffer_unordered(self.settings.probe_concurrency.max(1));

        while let Some(result) = results.next().await {
            report.probed += 1;

            if cancel.is_cancelled() {
                report.abandoned = true;
                info!(
                    remaining = report.targets - report.published - report.publish_failures,
                    "Cancellation observed; abandoning cycle"
                );
                break;
            }

            match self.publisher.publish(&result).await {
                Ok(()) => report.published += 1,
                Err(e) => {
                    report.publish_failures += 1;
                    warn!(address = %result.address, error = %e, "Dropping probe result after publish failure");
                }
            }
        }

        self.stats.record(&report);
        debug!(
            probed = report.probed,
            published = report.published,
            publish_failures = report.publish_failures,
            "Probe cycle finished"
        );
        report
    }
}
