//! Intake loop: pull records from the source, feed the pool, stop cleanly.

use anyhow::{anyhow, Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use forwarder_core::{
    CommitSink, Decoder, Dispatcher, FeatureFlags, ForwarderConfig, ForwardingPool, Metrics,
    OffsetCommitter, RecordFailure, RecordSource, ShutdownReport, WorkQueue,
};

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Stop intake after this many records have been submitted
    pub max_records: Option<u64>,
    /// How long in-flight records may take to finish once intake stops
    pub shutdown_timeout: Duration,
}

impl RunOptions {
    pub fn from_config(config: &ForwarderConfig, max_records: Option<u64>) -> Self {
        Self {
            max_records,
            shutdown_timeout: config.shutdown_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub submitted: u64,
    pub report: ShutdownReport,
}

/// Wire the decoder, dispatcher and committer into a running pool.
pub fn build_pool(
    config: &ForwarderConfig,
    flags: Arc<dyn FeatureFlags>,
    queue: Arc<dyn WorkQueue>,
    commits: Arc<dyn CommitSink>,
    metrics: Arc<dyn Metrics>,
) -> Result<ForwardingPool> {
    config.validate().context("Invalid forwarder configuration")?;

    let decoder = Decoder::new(flags, Arc::clone(&metrics), config.default_queue.clone());
    let dispatcher = Dispatcher::new(queue, Arc::clone(&metrics));
    let committer = Arc::new(OffsetCommitter::new(commits));

    let pool = ForwardingPool::new(config.pool_config(), decoder, dispatcher, committer, metrics)?;
    Ok(pool)
}

enum Interrupt {
    Shutdown,
    Failed(RecordFailure),
}

impl Interrupt {
    fn into_outcome(self) -> Result<()> {
        match self {
            Interrupt::Shutdown => {
                info!("Shutdown requested, stopping intake");
                Ok(())
            }
            Interrupt::Failed(failure) => Err(failure_error(&failure)),
        }
    }
}

/// Forward records from `source` until `shutdown` resolves, `max_records` have been
/// submitted, or a record fails permanently.
///
/// The pool is always shut down before returning. A permanent failure is returned as
/// an error after the drain so the process exits and the stream is redelivered from
/// the last committed offset.
pub async fn run_forwarder<F>(
    source: &dyn RecordSource,
    mut pool: ForwardingPool,
    shutdown: F,
    options: RunOptions,
) -> Result<RunSummary>
where
    F: Future<Output = ()>,
{
    let mut failures = pool
        .take_failures()
        .ok_or_else(|| anyhow!("Failure channel already taken from the pool"))?;
    tokio::pin!(shutdown);

    let mut submitted: u64 = 0;
    let outcome: Result<()> = loop {
        if options.max_records.is_some_and(|max| submitted >= max) {
            info!(submitted, "Reached max records, stopping intake");
            break Ok(());
        }

        let next = tokio::select! {
            biased;
            _ = &mut shutdown => Err(Interrupt::Shutdown),
            Some(failure) = failures.recv() => Err(Interrupt::Failed(failure)),
            record = source.next_record() => Ok(record),
        };

        let record = match next {
            Ok(Ok(record)) => record,
            Ok(Err(e)) => break Err(e).context("Failed to read from the record source"),
            Err(interrupt) => break interrupt.into_outcome(),
        };

        // Revocations are reported before any record of a later assignment.
        for partition in source.take_revoked() {
            let abandoned = pool.revoke(&partition);
            info!(%partition, abandoned, "Stopped tracking revoked partition");
        }

        // Submission can wait on backpressure; keep listening for shutdown meanwhile.
        let submit = tokio::select! {
            biased;
            _ = &mut shutdown => Err(Interrupt::Shutdown),
            Some(failure) = failures.recv() => Err(Interrupt::Failed(failure)),
            result = pool.submit(record) => Ok(result),
        };

        match submit {
            Ok(Ok(())) => submitted += 1,
            Ok(Err(e)) => break Err(e).context("Failed to submit record"),
            Err(interrupt) => break interrupt.into_outcome(),
        }
    };

    let report = pool.shutdown(options.shutdown_timeout).await;

    outcome?;
    if let Ok(failure) = failures.try_recv() {
        return Err(failure_error(&failure));
    }

    info!(submitted, drained = report.drained, "Forwarder stopped");
    Ok(RunSummary { submitted, report })
}

fn failure_error(failure: &RecordFailure) -> anyhow::Error {
    error!(
        partition = %failure.partition,
        offset = failure.offset,
        "Record could not be forwarded: {}",
        failure.reason
    );
    anyhow!(
        "Record at {} offset {} could not be forwarded: {}",
        failure.partition,
        failure.offset,
        failure.reason
    )
}
