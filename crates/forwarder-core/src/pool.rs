use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use forwarder_types::{ConsumedRecord, Error, Metrics, Partition, Result};

use crate::committer::{Completion, Generation, OffsetCommitter};
use crate::decoder::Decoder;
use crate::dispatcher::Dispatcher;
use crate::metrics::FAILED_METRIC;

/// Sizing and retry policy for the forwarding pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker tasks
    pub concurrency: usize,
    /// Maximum number of submitted records not yet finished
    pub max_pending: usize,
    /// Extra enqueue attempts before a record is marked failed
    pub dispatch_retries: u32,
    /// Base backoff between enqueue attempts
    pub retry_backoff: Duration,
}

/// A record that could not be forwarded. Its partition stops committing at it.
#[derive(Debug, Clone)]
pub struct RecordFailure {
    pub partition: Partition,
    pub offset: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every submitted record finished before the timeout
    pub drained: bool,
    /// Records left uncommitted (pending, failed, or behind a failure)
    pub in_flight: usize,
}

struct Job {
    record: ConsumedRecord,
    generation: Generation,
    // Held until the record is accounted for; releasing it admits the next record.
    permit: OwnedSemaphorePermit,
}

struct Worker {
    decoder: Decoder,
    dispatcher: Dispatcher,
    committer: Arc<OffsetCommitter>,
    metrics: Arc<dyn Metrics>,
    dispatch_retries: u32,
    retry_backoff: Duration,
    failures: mpsc::UnboundedSender<RecordFailure>,
}

/// Runs decode and dispatch for a stream of records on a fixed set of workers.
///
/// `submit` suspends once `max_pending` records are outstanding, so a slow work
/// queue stalls the transport instead of growing memory.
pub struct ForwardingPool {
    intake: mpsc::Sender<Job>,
    slots: Arc<Semaphore>,
    max_pending: usize,
    committer: Arc<OffsetCommitter>,
    workers: JoinSet<()>,
    failures: Option<mpsc::UnboundedReceiver<RecordFailure>>,
}

impl ForwardingPool {
    /// Start the workers. Must be called from within a tokio runtime.
    pub fn new(
        config: PoolConfig,
        decoder: Decoder,
        dispatcher: Dispatcher,
        committer: Arc<OffsetCommitter>,
        metrics: Arc<dyn Metrics>,
    ) -> Result<Self> {
        config.validate()?;

        let (intake, jobs) = mpsc::channel(config.max_pending);
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        let jobs = Arc::new(Mutex::new(jobs));
        let worker = Arc::new(Worker {
            decoder,
            dispatcher,
            committer: Arc::clone(&committer),
            metrics,
            dispatch_retries: config.dispatch_retries,
            retry_backoff: config.retry_backoff,
            failures: failures_tx,
        });

        let mut workers = JoinSet::new();
        for id in 0..config.concurrency {
            workers.spawn(Arc::clone(&worker).run(id, Arc::clone(&jobs)));
        }

        info!(
            concurrency = config.concurrency,
            max_pending = config.max_pending,
            "Forwarding pool started"
        );

        Ok(Self {
            intake,
            slots: Arc::new(Semaphore::new(config.max_pending)),
            max_pending: config.max_pending,
            committer,
            workers,
            failures: Some(failures_rx),
        })
    }

    /// Hand a record to the pool. Records must be submitted in consumption order.
    ///
    /// Waits for a free slot when `max_pending` records are outstanding.
    pub async fn submit(&self, record: ConsumedRecord) -> Result<()> {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| Error::PoolClosed)?;

        let generation = self.committer.register(&record.partition, record.offset)?;

        self.intake
            .send(Job {
                record,
                generation,
                permit,
            })
            .await
            .map_err(|_| Error::PoolClosed)
    }

    /// Number of submitted records that have not finished yet.
    pub fn outstanding(&self) -> usize {
        self.max_pending - self.slots.available_permits()
    }

    /// Forget a partition that was taken away from this consumer.
    ///
    /// Its records still in flight finish but are neither committed nor reported
    /// as failures. Returns how many were abandoned.
    pub fn revoke(&self, partition: &Partition) -> usize {
        self.committer.revoke(partition)
    }

    /// Receiver for permanently failed records. Can only be taken once.
    pub fn take_failures(&mut self) -> Option<mpsc::UnboundedReceiver<RecordFailure>> {
        self.failures.take()
    }

    /// Stop intake and let submitted records finish for up to `timeout`.
    ///
    /// Whatever has not finished by then is abandoned without being committed.
    pub async fn shutdown(self, timeout: Duration) -> ShutdownReport {
        let Self {
            intake,
            mut workers,
            committer,
            ..
        } = self;

        drop(intake);

        let drained = tokio::time::timeout(timeout, async {
            while workers.join_next().await.is_some() {}
        })
        .await
        .is_ok();

        if !drained {
            warn!(
                timeout_secs = timeout.as_secs_f64(),
                "Forwarding pool did not drain in time, abandoning remaining records"
            );
            workers.abort_all();
            while workers.join_next().await.is_some() {}
        }

        let report = ShutdownReport {
            drained,
            in_flight: committer.in_flight(),
        };
        info!(drained, in_flight = report.in_flight, "Forwarding pool stopped");
        report
    }
}

impl Worker {
    async fn run(self: Arc<Self>, id: usize, jobs: Arc<Mutex<mpsc::Receiver<Job>>>) {
        loop {
            let job = jobs.lock().await.recv().await;
            match job {
                Some(job) => self.process(job).await,
                None => break,
            }
        }
        debug!(worker = id, "Intake closed, worker exiting");
    }

    async fn process(&self, job: Job) {
        let Job {
            record,
            generation,
            permit,
        } = job;

        let completion = match AssertUnwindSafe(self.forward(&record))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => Completion::Done,
            Ok(Err(e)) => {
                self.fail(&record, generation, e.to_string());
                Completion::Failed
            }
            Err(panic) => {
                let reason = Error::WorkerPanic(panic_message(&panic)).to_string();
                self.fail(&record, generation, reason);
                Completion::Failed
            }
        };

        if let Err(e) = self
            .committer
            .complete(&record.partition, record.offset, generation, completion)
        {
            error!(
                partition = %record.partition,
                offset = record.offset,
                "Failed to record completion: {e}"
            );
        }
        drop(permit);
    }

    /// Decode and dispatch one record.
    async fn forward(&self, record: &ConsumedRecord) -> Result<()> {
        let Some(descriptor) = self.decoder.decode(record)? else {
            debug!(
                partition = %record.partition,
                offset = record.offset,
                "Record carries no task"
            );
            return Ok(());
        };

        let mut attempt = 0;
        loop {
            match self.dispatcher.dispatch(&descriptor).await {
                Ok(_) => return Ok(()),
                Err(e) if attempt < self.dispatch_retries => {
                    attempt += 1;
                    warn!(
                        event_id = %descriptor.event_id,
                        partition = %record.partition,
                        offset = record.offset,
                        attempt,
                        "Dispatch failed, retrying: {e}"
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => {
                    error!(
                        event_id = %descriptor.event_id,
                        partition = %record.partition,
                        offset = record.offset,
                        queue = %descriptor.queue,
                        "Dispatch failed: {e}"
                    );
                    return Err(e.into());
                }
            }
        }
    }

    fn fail(&self, record: &ConsumedRecord, generation: Generation, reason: String) {
        if !self.committer.is_current(&record.partition, generation) {
            debug!(
                partition = %record.partition,
                offset = record.offset,
                "Record of a revoked partition failed, another consumer owns it now: {reason}"
            );
            return;
        }
        error!(
            partition = %record.partition,
            offset = record.offset,
            timestamp = ?record.timestamp,
            "Could not forward record, partition is blocked at this offset: {reason}"
        );
        self.metrics
            .incr(FAILED_METRIC, &[("topic", record.partition.topic.as_str())]);
        // The receiver may already be gone during shutdown.
        let _ = self.failures.send(RecordFailure {
            partition: record.partition.clone(),
            offset: record.offset,
            reason,
        });
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
