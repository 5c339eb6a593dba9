use std::sync::Arc;
use tokio_test::assert_ok;

use forwarder_core::testing::{RecordingCommits, RecordingMetrics, RecordingQueue, VecSource};
use forwarder_core::{
    ConsumedRecord, FeatureFlags, ForwarderConfig, ForwardingPool, Partition, StaticFlags,
    KAFKA_HEADERS_FLAG,
};
use post_process_forwarder::{build_pool, run_forwarder, RunOptions, RunSummary};

/// Collaborators shared by one test run.
pub struct Harness {
    pub queue: Arc<RecordingQueue>,
    pub commits: Arc<RecordingCommits>,
    pub metrics: Arc<RecordingMetrics>,
    pub use_headers: bool,
}

impl Harness {
    pub fn new(use_headers: bool) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("post_process_forwarder=debug,forwarder_core=debug")
            .with_test_writer()
            .try_init();

        Self {
            queue: Arc::new(RecordingQueue::default()),
            commits: Arc::new(RecordingCommits::default()),
            metrics: Arc::new(RecordingMetrics::default()),
            use_headers,
        }
    }

    pub fn pool(&self, config: &ForwarderConfig) -> ForwardingPool {
        let flags: Arc<dyn FeatureFlags> =
            Arc::new(StaticFlags::new().with(KAFKA_HEADERS_FLAG, self.use_headers));
        assert_ok!(build_pool(
            config,
            flags,
            self.queue.clone(),
            self.commits.clone(),
            self.metrics.clone(),
        ))
    }

    /// Submit every record, then drain the pool.
    pub async fn run(
        &self,
        config: &ForwarderConfig,
        records: Vec<ConsumedRecord>,
    ) -> anyhow::Result<RunSummary> {
        let max_records = Some(records.len() as u64);
        let source = VecSource::new(records);
        run_forwarder(
            &source,
            self.pool(config),
            std::future::pending(),
            RunOptions::from_config(config, max_records),
        )
        .await
    }

    /// Cache keys of every acknowledged enqueue, in enqueue order.
    pub fn cache_keys(&self) -> Vec<String> {
        self.queue
            .calls()
            .into_iter()
            .map(|(_, request)| request.cache_key)
            .collect()
    }
}

pub fn config(concurrency: usize, max_pending: usize) -> ForwarderConfig {
    ForwarderConfig {
        concurrency,
        max_pending,
        dispatch_retries: 0,
        retry_backoff_ms: 1,
        ..Default::default()
    }
}

pub fn partition(index: i32) -> Partition {
    Partition::new("events", index)
}

/// Payload-encoded insert. Without a queue it goes to the default queue.
pub fn payload_record(
    partition: Partition,
    offset: i64,
    event_id: &str,
    project_id: u64,
    queue: Option<&str>,
) -> ConsumedRecord {
    let queue = queue
        .map(|q| format!(r#", "queue": "{q}""#))
        .unwrap_or_default();
    let payload = format!(
        r#"[2, "insert",
            {{"event_id": "{event_id}", "project_id": {project_id}, "group_id": 42}},
            {{"is_new": false, "is_regression": false, "is_new_group_environment": false{queue}}}]"#
    );
    ConsumedRecord::new(partition, offset, payload)
}

/// Payload-encoded group maintenance operation.
pub fn maintenance_record(partition: Partition, offset: i64) -> ConsumedRecord {
    ConsumedRecord::new(
        partition,
        offset,
        r#"[2, "start_merge", {"project_id": 7, "previous_group_ids": [1], "new_group_id": 2}]"#,
    )
}
