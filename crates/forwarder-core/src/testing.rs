//! In-memory collaborators and fixtures for tests.
//!
//! Used by this crate's unit tests and by the integration tests of the binary.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;

use forwarder_types::{
    CommitSink, ConsumedRecord, DispatchError, DispatchRequest, Error, Metrics, Partition,
    RecordSource, Result, TaskDescriptor, WorkQueue,
};

/// Descriptor with group 42, no regression, and a new group environment.
pub fn descriptor(event_id: &str, project_id: u64, queue: &str) -> TaskDescriptor {
    TaskDescriptor {
        event_id: event_id.to_string(),
        project_id,
        group_id: Some(42),
        is_new: true,
        is_regression: Some(false),
        is_new_group_environment: true,
        primary_hash: None,
        queue: queue.to_string(),
        skip: false,
        group_states: None,
        occurrence_id: None,
    }
}

/// Header-encoded insert record matching [`descriptor`]. The body is empty.
pub fn header_record(
    partition: Partition,
    offset: i64,
    event_id: &str,
    project_id: u64,
    queue: &str,
) -> ConsumedRecord {
    let project_id = project_id.to_string();
    ConsumedRecord::new(partition, offset, Vec::new())
        .with_header("version", Some(b"2"))
        .with_header("operation", Some(b"insert"))
        .with_header("event_id", Some(event_id.as_bytes()))
        .with_header("project_id", Some(project_id.as_bytes()))
        .with_header("group_id", Some(b"42"))
        .with_header("primary_hash", None)
        .with_header("is_new", Some(b"1"))
        .with_header("is_regression", Some(b"0"))
        .with_header("is_new_group_environment", Some(b"1"))
        .with_header("queue", Some(queue.as_bytes()))
        .with_header("skip_consume", Some(b"0"))
}

fn locked<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Work queue that remembers every acknowledged request.
#[derive(Default)]
pub struct RecordingQueue {
    calls: Mutex<Vec<(String, DispatchRequest)>>,
    fail_remaining: AtomicUsize,
    failing_keys: Mutex<HashSet<String>>,
    panicking_keys: Mutex<HashSet<String>>,
}

impl RecordingQueue {
    /// Acknowledged `(queue, request)` pairs in enqueue order.
    pub fn calls(&self) -> Vec<(String, DispatchRequest)> {
        locked(&self.calls).clone()
    }

    /// Fail the next `n` enqueue calls.
    pub fn fail_next(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    /// Always fail requests with this cache key.
    pub fn fail_cache_key(&self, cache_key: &str) {
        locked(&self.failing_keys).insert(cache_key.to_string());
    }

    /// Panic on requests with this cache key.
    pub fn panic_on_cache_key(&self, cache_key: &str) {
        locked(&self.panicking_keys).insert(cache_key.to_string());
    }
}

#[async_trait]
impl WorkQueue for RecordingQueue {
    async fn enqueue(
        &self,
        queue: &str,
        request: &DispatchRequest,
    ) -> std::result::Result<(), DispatchError> {
        if locked(&self.panicking_keys).contains(&request.cache_key) {
            panic!("work queue exploded on {}", request.cache_key);
        }

        let transient = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if transient || locked(&self.failing_keys).contains(&request.cache_key) {
            return Err(DispatchError::Enqueue {
                queue: queue.to_string(),
                message: "broker unavailable".to_string(),
            });
        }

        locked(&self.calls).push((queue.to_string(), request.clone()));
        Ok(())
    }
}

/// Work queue whose enqueue calls block until released.
pub struct GatedQueue {
    inner: RecordingQueue,
    gate: Semaphore,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl Default for GatedQueue {
    fn default() -> Self {
        Self {
            inner: RecordingQueue::default(),
            gate: Semaphore::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }
}

impl GatedQueue {
    /// Let `n` more enqueue calls complete.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Highest number of enqueue calls seen waiting at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkQueue for GatedQueue {
    async fn enqueue(
        &self,
        queue: &str,
        request: &DispatchRequest,
    ) -> std::result::Result<(), DispatchError> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        let permit = self.gate.acquire().await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        match permit {
            Ok(permit) => permit.forget(),
            Err(_) => {
                return Err(DispatchError::Enqueue {
                    queue: queue.to_string(),
                    message: "gate closed".to_string(),
                })
            }
        }

        self.inner.enqueue(queue, request).await
    }
}

/// Work queue that holds each request until its cache key is released.
#[derive(Default)]
pub struct KeyedGateQueue {
    inner: RecordingQueue,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl KeyedGateQueue {
    /// Let one request with `cache_key` complete.
    pub fn release(&self, cache_key: &str) {
        self.gate(cache_key).add_permits(1);
    }

    /// Acknowledged `(queue, request)` pairs in completion order.
    pub fn calls(&self) -> Vec<(String, DispatchRequest)> {
        self.inner.calls()
    }

    fn gate(&self, cache_key: &str) -> Arc<Semaphore> {
        let mut gates = locked(&self.gates);
        let gate = gates
            .entry(cache_key.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(0)));
        Arc::clone(gate)
    }
}

#[async_trait]
impl WorkQueue for KeyedGateQueue {
    async fn enqueue(
        &self,
        queue: &str,
        request: &DispatchRequest,
    ) -> std::result::Result<(), DispatchError> {
        let gate = self.gate(&request.cache_key);
        match gate.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => {
                return Err(DispatchError::Enqueue {
                    queue: queue.to_string(),
                    message: "gate closed".to_string(),
                })
            }
        }
        self.inner.enqueue(queue, request).await
    }
}

/// Commit sink that remembers every successful commit.
#[derive(Default)]
pub struct RecordingCommits {
    commits: Mutex<Vec<(Partition, i64)>>,
    fail_remaining: AtomicUsize,
}

impl RecordingCommits {
    pub fn fail_next(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    /// All commits in the order they were made.
    pub fn all(&self) -> Vec<(Partition, i64)> {
        locked(&self.commits).clone()
    }

    /// Committed offsets for one partition, in order.
    pub fn offsets(&self, partition: &Partition) -> Vec<i64> {
        locked(&self.commits)
            .iter()
            .filter(|(p, _)| p == partition)
            .map(|(_, offset)| *offset)
            .collect()
    }

    pub fn last(&self, partition: &Partition) -> Option<i64> {
        self.offsets(partition).last().copied()
    }
}

impl CommitSink for RecordingCommits {
    fn commit(&self, partition: &Partition, offset: i64) -> Result<()> {
        if self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::Commit("coordinator unavailable".to_string()));
        }
        locked(&self.commits).push((partition.clone(), offset));
        Ok(())
    }
}

/// Metrics sink that keeps everything it is given.
#[derive(Default)]
pub struct RecordingMetrics {
    timings: Mutex<Vec<String>>,
    counters: Mutex<HashMap<String, usize>>,
}

impl RecordingMetrics {
    /// Recorded timers as `key:instance`, in order.
    pub fn timings(&self) -> Vec<String> {
        locked(&self.timings).clone()
    }

    pub fn count(&self, key: &str) -> usize {
        locked(&self.counters).get(key).copied().unwrap_or(0)
    }
}

impl Metrics for RecordingMetrics {
    fn timing(&self, key: &str, instance: &str, _elapsed: Duration) {
        locked(&self.timings).push(format!("{key}:{instance}"));
    }

    fn incr(&self, key: &str, _tags: &[(&str, &str)]) {
        *locked(&self.counters).entry(key.to_string()).or_default() += 1;
    }
}

/// Record source that replays a fixed list, then waits forever.
#[derive(Default)]
pub struct VecSource {
    records: Mutex<VecDeque<ConsumedRecord>>,
}

impl VecSource {
    pub fn new(records: impl IntoIterator<Item = ConsumedRecord>) -> Self {
        Self {
            records: Mutex::new(records.into_iter().collect()),
        }
    }
}

#[async_trait]
impl RecordSource for VecSource {
    async fn next_record(&self) -> Result<ConsumedRecord> {
        let next = locked(&self.records).pop_front();
        match next {
            Some(record) => Ok(record),
            None => std::future::pending().await,
        }
    }
}
