//! Intake loop behavior: shutdown, source errors, permanent record failures and
//! partitions lost to a rebalance.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

use forwarder_core::testing::{header_record, RecordingCommits, VecSource};
use forwarder_core::{ConsumedRecord, Error, Partition, RecordSource};
use post_process_forwarder::{run_forwarder, RunOptions};

use crate::harness::{config, partition, Harness};

struct BrokenSource;

#[async_trait]
impl RecordSource for BrokenSource {
    async fn next_record(&self) -> forwarder_core::Result<ConsumedRecord> {
        Err(Error::Transport("broker down".to_string()))
    }
}

enum Step {
    Record(ConsumedRecord),
    /// Lose the partition once `offset` is committed, like a consumer group rebalance.
    Revoke(Partition, i64),
}

/// Replays records and revocations in order, then waits forever.
struct RebalancingSource {
    steps: Mutex<VecDeque<Step>>,
    revoked: Mutex<Vec<Partition>>,
    commits: Arc<RecordingCommits>,
}

impl RebalancingSource {
    fn new(steps: Vec<Step>, commits: Arc<RecordingCommits>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            revoked: Mutex::new(Vec::new()),
            commits,
        }
    }
}

#[async_trait]
impl RecordSource for RebalancingSource {
    async fn next_record(&self) -> forwarder_core::Result<ConsumedRecord> {
        loop {
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Record(record)) => return Ok(record),
                Some(Step::Revoke(partition, offset)) => {
                    while self.commits.last(&partition) != Some(offset) {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                    }
                    self.revoked.lock().unwrap().push(partition);
                }
                None => std::future::pending::<()>().await,
            }
        }
    }

    fn take_revoked(&self) -> Vec<Partition> {
        std::mem::take(&mut *self.revoked.lock().unwrap())
    }
}

#[tokio::test]
async fn test_shutdown_drains_and_returns() {
    let harness = Harness::new(true);
    let p = partition(0);
    let config = config(2, 4);
    let source = VecSource::new((0..3).map(|i| header_record(p.clone(), i, &format!("e{i}"), 7, "q1")));

    // The source never ends on its own; stop once everything is committed.
    let commits = Arc::clone(&harness.commits);
    let watched = p.clone();
    let shutdown = async move {
        while commits.last(&watched) != Some(2) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };

    let summary = assert_ok!(
        run_forwarder(
            &source,
            harness.pool(&config),
            shutdown,
            RunOptions::from_config(&config, None),
        )
        .await
    );

    assert_eq!(summary.submitted, 3);
    assert!(summary.report.drained);
    assert_eq!(summary.report.in_flight, 0);
    assert_eq!(harness.cache_keys().len(), 3);
}

#[tokio::test]
async fn test_source_error_stops_the_forwarder() {
    let harness = Harness::new(true);
    let config = config(1, 1);

    let err = assert_err!(
        run_forwarder(
            &BrokenSource,
            harness.pool(&config),
            std::future::pending(),
            RunOptions::from_config(&config, None),
        )
        .await
    );

    assert!(format!("{err:#}").contains("broker down"));
    assert!(harness.commits.all().is_empty());
}

#[tokio::test]
async fn test_permanent_failure_stops_before_the_failed_offset() {
    let harness = Harness::new(true);
    let p = partition(0);
    harness.queue.fail_cache_key("e:bad:7");

    let records = vec![
        header_record(p.clone(), 0, "e0", 7, "q1"),
        header_record(p.clone(), 1, "e1", 7, "q1"),
        header_record(p.clone(), 2, "bad", 7, "q1"),
        header_record(p.clone(), 3, "e3", 7, "q1"),
    ];

    let err = assert_err!(harness.run(&config(1, 4), records).await);

    assert!(format!("{err:#}").contains("offset 2"), "unexpected error: {err:#}");
    let offsets = harness.commits.offsets(&p);
    assert_eq!(offsets.last(), Some(&1));
    assert!(offsets.iter().all(|offset| *offset < 2));
    assert!(!harness.cache_keys().contains(&"e:bad:7".to_string()));
}

#[tokio::test]
async fn test_transient_enqueue_failures_are_retried() {
    let harness = Harness::new(true);
    let p = partition(0);
    harness.queue.fail_next(2);

    let config = forwarder_core::ForwarderConfig {
        dispatch_retries: 3,
        ..config(1, 2)
    };
    let records = vec![
        header_record(p.clone(), 0, "e0", 7, "q1"),
        header_record(p.clone(), 1, "e1", 7, "q1"),
    ];

    assert_ok!(harness.run(&config, records).await);

    assert_eq!(harness.cache_keys(), vec!["e:e0:7", "e:e1:7"]);
    assert_eq!(harness.commits.last(&p), Some(1));
}

#[tokio::test]
async fn test_redelivery_after_rebalance_keeps_forwarding() {
    let harness = Harness::new(true);
    let p = partition(0);
    let other = partition(1);
    let record = |p: &Partition, offset: i64| {
        header_record(p.clone(), offset, &format!("e{}-{offset}", p.index), 7, "q1")
    };

    // The broker resumes the partition below what this consumer already registered.
    let steps = vec![
        Step::Record(record(&p, 0)),
        Step::Record(record(&p, 1)),
        Step::Record(record(&p, 2)),
        Step::Record(record(&other, 10)),
        Step::Revoke(p.clone(), 2),
        Step::Record(record(&p, 1)),
        Step::Record(record(&p, 2)),
        Step::Record(record(&p, 3)),
        Step::Record(record(&other, 11)),
    ];
    let source = RebalancingSource::new(steps, Arc::clone(&harness.commits));
    // One worker, so each partition commits every offset in turn.
    let config = config(1, 4);

    let summary = assert_ok!(
        run_forwarder(
            &source,
            harness.pool(&config),
            std::future::pending(),
            RunOptions::from_config(&config, Some(8)),
        )
        .await
    );

    assert_eq!(summary.submitted, 8);
    assert!(summary.report.drained);
    assert_eq!(summary.report.in_flight, 0);
    assert_eq!(harness.cache_keys().len(), 8);
    assert_eq!(harness.commits.offsets(&p), vec![0, 1, 2, 1, 2, 3]);
    assert_eq!(harness.commits.last(&other), Some(11));
}
