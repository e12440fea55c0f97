mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

use common::{
    eventually, target, FailingDirectory, FixedDirectory, RecordingPublisher, ScriptedProber,
};
use pingwatch::scheduler::{ProbeScheduler, SchedulerSettings};

fn settings(interval_ms: u64) -> SchedulerSettings {
    SchedulerSettings {
        interval: Duration::from_millis(interval_ms),
        probe_timeout: Duration::from_millis(200),
        probe_concurrency: 4,
    }
}

#[tokio::test]
async fn test_unreachable_target_is_published_as_unreachable() {
    let directory = Arc::new(FixedDirectory::new(vec![
        target("a", "10.0.0.2"),
        target("b", "10.0.0.3"),
    ]));
    let publisher = Arc::new(RecordingPublisher::default());
    let scheduler = ProbeScheduler::new(
        directory,
        Arc::new(ScriptedProber::down(&["10.0.0.3"])),
        publisher.clone(),
        settings(50),
    );

    let report = scheduler.run_cycle(&CancellationToken::new()).await;
    assert_eq!(report.published, 2);

    let published = publisher.published.lock().clone();
    let a = published.iter().find(|r| r.address == "10.0.0.2").unwrap();
    let b = published.iter().find(|r| r.address == "10.0.0.3").unwrap();
    assert!(a.reachable);
    assert!(!b.reachable);
    assert!(b.latency() <= Duration::from_secs(1));
}

#[tokio::test]
async fn test_empty_directory_publishes_nothing() {
    let publisher = Arc::new(RecordingPublisher::default());
    let scheduler = ProbeScheduler::new(
        Arc::new(FixedDirectory::new(vec![])),
        Arc::new(ScriptedProber::all_up()),
        publisher.clone(),
        settings(50),
    );

    let report = scheduler.run_cycle(&CancellationToken::new()).await;

    assert_eq!(report.targets, 0);
    assert!(!report.skipped);
    assert!(publisher.published.lock().is_empty());
}

#[tokio::test]
async fn test_publish_rejection_is_absorbed() {
    let publisher = Arc::new(RecordingPublisher::rejecting(&["10.0.0.2"]));
    let scheduler = ProbeScheduler::new(
        Arc::new(FixedDirectory::new(vec![
            target("a", "10.0.0.2"),
            target("b", "10.0.0.3"),
            target("c", "10.0.0.4"),
        ])),
        Arc::new(ScriptedProber::all_up()),
        publisher.clone(),
        settings(50),
    );

    let report = scheduler.run_cycle(&CancellationToken::new()).await;

    assert_eq!(report.publish_failures, 1);
    assert_eq!(publisher.addresses(), vec!["10.0.0.3", "10.0.0.4"]);
}

#[tokio::test]
async fn test_discovery_failure_keeps_ticking() {
    let publisher = Arc::new(RecordingPublisher::default());
    let scheduler = Arc::new(ProbeScheduler::new(
        Arc::new(FailingDirectory),
        Arc::new(ScriptedProber::all_up()),
        publisher.clone(),
        settings(10),
    ));
    let stats = scheduler.stats();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        async move { scheduler.run(cancel).await }
    });

    assert!(eventually(Duration::from_secs(2), || stats.snapshot().skipped_cycles >= 3).await);
    cancel.cancel();
    let snapshot = handle.await.unwrap();

    assert_eq!(snapshot.cycles, snapshot.skipped_cycles);
    assert!(publisher.published.lock().is_empty());
}

#[tokio::test]
async fn test_every_tick_probes_every_target() {
    let directory = Arc::new(FixedDirectory::new(vec![
        target("a", "10.0.0.2"),
        target("b", "10.0.0.3"),
    ]));
    let prober = Arc::new(ScriptedProber::all_up());
    let publisher = Arc::new(RecordingPublisher::default());
    let scheduler = Arc::new(ProbeScheduler::new(
        directory.clone(),
        prober.clone(),
        publisher.clone(),
        settings(10),
    ));
    let stats = scheduler.stats();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        async move { scheduler.run(cancel).await }
    });

    assert!(eventually(Duration::from_secs(2), || stats.snapshot().cycles >= 3).await);
    cancel.cancel();
    let snapshot = handle.await.unwrap();

    assert_eq!(snapshot.probes, snapshot.cycles * 2);
    assert_eq!(snapshot.published, snapshot.probes);
    assert_eq!(directory.calls.load(Ordering::SeqCst) as u64, snapshot.cycles);
    assert_eq!(prober.probe_count() as u64, snapshot.probes);
}

#[tokio::test]
async fn test_cancel_mid_cycle_stops_publishing() {
    let targets = (0..8).map(|i| target(&format!("c{i}"), &format!("10.0.1.{i}"))).collect();
    let publisher = Arc::new(RecordingPublisher::default());
    let scheduler = ProbeScheduler::new(
        Arc::new(FixedDirectory::new(targets)),
        Arc::new(ScriptedProber::all_up().with_delay(Duration::from_millis(30))),
        publisher.clone(),
        SchedulerSettings {
            probe_concurrency: 1,
            ..settings(50)
        },
    );

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(75)).await;
        stopper.cancel();
    });

    let report = scheduler.run_cycle(&cancel).await;

    assert!(report.abandoned);
    assert!(report.published < 8);
    assert_eq!(publisher.published.lock().len(), report.published);
}

#[tokio::test]
async fn test_concurrency_bounds_cycle_duration() {
    let targets = (0..8).map(|i| target(&format!("c{i}"), &format!("10.0.2.{i}"))).collect();
    let publisher = Arc::new(RecordingPublisher::default());
    let scheduler = ProbeScheduler::new(
        Arc::new(FixedDirectory::new(targets)),
        Arc::new(ScriptedProber::all_up().with_delay(Duration::from_millis(100))),
        publisher.clone(),
        SchedulerSettings {
            probe_concurrency: 8,
            ..settings(50)
        },
    );

    let started = std::time::Instant::now();
    let report = scheduler.run_cycle(&CancellationToken::new()).await;

    assert_eq!(report.published, 8);
    // Sequential probing would take at least 800ms
    assert!(started.elapsed() < Duration::from_millis(600));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_n_targets_yield_n_probes(
        count in 0usize..40,
        concurrency in 1usize..10,
        down_every in 1usize..5,
    ) {
        let targets: Vec<_> = (0..count)
            .map(|i| target(&format!("c{i}"), &format!("10.1.{}.{}", i / 250, i % 250)))
            .collect();
        let down: Vec<String> = targets
            .iter()
            .enumerate()
            .filter(|(i, _)| i % down_every == 0)
            .map(|(_, t)| t.address.clone())
            .collect();
        let down_refs: Vec<&str> = down.iter().map(String::as_str).collect();

        let prober = Arc::new(ScriptedProber::down(&down_refs));
        let publisher = Arc::new(RecordingPublisher::default());
        let scheduler = ProbeScheduler::new(
            Arc::new(FixedDirectory::new(targets)),
            prober.clone(),
            publisher.clone(),
            SchedulerSettings { probe_concurrency: concurrency, ..settings(50) },
        );

        let report = tokio_test::block_on(scheduler.run_cycle(&CancellationToken::new()));

        prop_assert_eq!(report.targets, count);
        prop_assert_eq!(report.probed, count);
        prop_assert_eq!(report.published, count);
        prop_assert_eq!(prober.probe_count(), count);

        let published = publisher.published.lock();
        let unreachable = published.iter().filter(|r| !r.reachable).count();
        prop_assert_eq!(unreachable, down.len());
    }
}
