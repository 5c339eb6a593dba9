//! What reaches the work queue and what gets committed.

use forwarder_core::metrics::{DURATION_METRIC, FALLBACK_METRIC, SKIPPED_METRIC};
use forwarder_core::testing::header_record;
use forwarder_core::ConsumedRecord;
use tokio_test::assert_ok;

use crate::harness::{config, maintenance_record, partition, payload_record, Harness};

#[tokio::test]
async fn test_header_record_is_enqueued_and_committed() {
    let harness = Harness::new(true);
    let p = partition(0);

    let summary = assert_ok!(
        harness
            .run(&config(2, 4), vec![header_record(p.clone(), 0, "e1", 7, "q1")])
            .await
    );

    assert_eq!(summary.submitted, 1);
    assert!(summary.report.drained);
    assert_eq!(summary.report.in_flight, 0);

    let calls = harness.queue.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "q1");
    assert_eq!(calls[0].1.cache_key, "e:e1:7");
    assert_eq!(calls[0].1.group_id, Some(42));
    assert_eq!(harness.commits.offsets(&p), vec![0]);
}

#[tokio::test]
async fn test_payload_only_when_headers_disabled() {
    let harness = Harness::new(false);
    let p = partition(0);
    // Headers describe a different event; they must be ignored.
    let record = payload_record(p.clone(), 0, "e2", 3, None)
        .with_header("version", Some(b"2"))
        .with_header("operation", Some(b"insert"))
        .with_header("event_id", Some(b"other"));

    assert_ok!(harness.run(&config(1, 1), vec![record]).await);

    let calls = harness.queue.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "post_process_errors");
    assert_eq!(calls[0].1.cache_key, "e:e2:3");
    assert_eq!(
        harness.metrics.timings(),
        vec![format!("{DURATION_METRIC}:payload")]
    );
}

#[tokio::test]
async fn test_broken_headers_fall_back_to_payload() {
    let harness = Harness::new(true);
    let p = partition(0);
    let record = payload_record(p.clone(), 0, "e3", 9, Some("q2"))
        .with_header("version", Some(b"2"))
        .with_header("operation", Some(b"insert"));

    assert_ok!(harness.run(&config(1, 1), vec![record]).await);

    assert_eq!(harness.cache_keys(), vec!["e:e3:9"]);
    assert_eq!(harness.queue.calls()[0].0, "q2");
    assert_eq!(harness.metrics.count(FALLBACK_METRIC), 1);
    assert_eq!(
        harness.metrics.timings(),
        vec![
            format!("{DURATION_METRIC}:headers"),
            format!("{DURATION_METRIC}:payload"),
        ]
    );
    assert_eq!(harness.commits.last(&p), Some(0));
}

#[tokio::test]
async fn test_skipped_record_is_committed_without_dispatch() {
    let harness = Harness::new(true);
    let p = partition(0);
    let record = header_record(p.clone(), 0, "e4", 7, "q1").with_header("skip_consume", Some(b"1"));

    assert_ok!(harness.run(&config(1, 1), vec![record]).await);

    assert!(harness.queue.calls().is_empty());
    assert_eq!(harness.metrics.count(SKIPPED_METRIC), 1);
    assert_eq!(harness.commits.last(&p), Some(0));
}

#[tokio::test]
async fn test_records_without_tasks_still_advance_the_watermark() {
    let harness = Harness::new(false);
    let p = partition(0);
    let records = vec![
        maintenance_record(p.clone(), 10),
        ConsumedRecord::new(p.clone(), 11, Vec::new()),
        payload_record(p.clone(), 12, "e5", 7, Some("q1")),
    ];

    assert_ok!(harness.run(&config(2, 3), records).await);

    assert_eq!(harness.cache_keys(), vec!["e:e5:7"]);
    assert_eq!(harness.commits.last(&p), Some(12));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_commits_are_ordered_per_partition() {
    let harness = Harness::new(true);
    let partitions = [partition(0), partition(1)];

    let mut records = Vec::new();
    for offset in 0..25 {
        for p in &partitions {
            let event_id = format!("p{}-{offset}", p.index);
            records.push(header_record(p.clone(), offset, &event_id, 7, "q1"));
        }
    }

    let summary = assert_ok!(harness.run(&config(4, 8), records).await);

    assert_eq!(summary.submitted, 50);
    assert_eq!(harness.queue.calls().len(), 50);
    for p in &partitions {
        let offsets = harness.commits.offsets(p);
        assert!(
            offsets.windows(2).all(|w| w[0] < w[1]),
            "commits for {p} went backwards: {offsets:?}"
        );
        assert_eq!(offsets.last(), Some(&24));
    }
}
