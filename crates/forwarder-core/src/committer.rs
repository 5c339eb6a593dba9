use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::{debug, info, warn};

use forwarder_types::{CommitSink, Error, Partition, Result};

/// Terminal status reported for an in-flight record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Forwarded, skipped, or carried no task.
    Done,
    /// Forwarding failed. Blocks the partition until resolved.
    Failed,
}

/// Identifies one assignment of a partition to this consumer.
///
/// Returned by [`OffsetCommitter::register`]. Completions carrying a generation that
/// was revoked in the meantime are dropped instead of committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordState {
    Pending,
    Done,
    Failed,
}

/// Progress of one partition.
///
/// `in_flight` holds every registered offset not yet folded into the watermark.
/// Contiguity follows registration order rather than `offset + 1`, so offset gaps
/// in the log (compaction, transaction markers) do not stall the partition.
#[derive(Debug)]
struct PartitionTracker {
    generation: Generation,
    revoked: bool,
    watermark: Option<i64>,
    last_registered: Option<i64>,
    in_flight: BTreeMap<i64, RecordState>,
}

impl PartitionTracker {
    fn new(generation: Generation) -> Self {
        Self {
            generation,
            revoked: false,
            watermark: None,
            last_registered: None,
            in_flight: BTreeMap::new(),
        }
    }

    fn register(&mut self, offset: i64) -> std::result::Result<(), i64> {
        if let Some(last) = self.last_registered {
            if offset <= last {
                return Err(last);
            }
        }
        self.last_registered = Some(offset);
        self.in_flight.insert(offset, RecordState::Pending);
        Ok(())
    }

    /// Fold the lowest run of finished offsets into the watermark.
    fn advance(&mut self) -> Option<i64> {
        let mut advanced = None;
        while let Some(entry) = self.in_flight.first_entry() {
            if *entry.get() != RecordState::Done {
                break;
            }
            advanced = Some(entry.remove_entry().0);
        }
        if advanced.is_some() {
            self.watermark = advanced;
        }
        advanced
    }
}

/// Commits, per partition, the highest offset below which every record has finished.
///
/// The partition table is only locked to find, create or drop an entry; all state
/// changes happen under that partition's own lock, and the commit for a partition is
/// issued while its lock is held so commits can never reach the sink out of order.
///
/// Tracking starts fresh after [`revoke`](Self::revoke), so a partition reassigned to
/// this consumer may be redelivered from its last committed offset.
pub struct OffsetCommitter {
    sink: Arc<dyn CommitSink>,
    partitions: RwLock<HashMap<Partition, Arc<Mutex<PartitionTracker>>>>,
    generations: AtomicU64,
}

impl OffsetCommitter {
    pub fn new(sink: Arc<dyn CommitSink>) -> Self {
        Self {
            sink,
            partitions: RwLock::new(HashMap::new()),
            generations: AtomicU64::new(0),
        }
    }

    /// Record that `offset` entered the pipeline. Must be called in consumption order.
    ///
    /// The returned generation has to be handed back to [`complete`](Self::complete).
    pub fn register(&self, partition: &Partition, offset: i64) -> Result<Generation> {
        let tracker = self.tracker(partition);
        let mut tracker = lock(&tracker);
        tracker
            .register(offset)
            .map_err(|last| Error::OffsetRegression {
                partition: partition.clone(),
                offset,
                last,
            })?;
        Ok(tracker.generation)
    }

    /// Record the outcome for `offset` and commit whatever became contiguous.
    ///
    /// Returns the new watermark if it moved. Completions for a revoked generation
    /// are ignored.
    pub fn complete(
        &self,
        partition: &Partition,
        offset: i64,
        generation: Generation,
        completion: Completion,
    ) -> Result<Option<i64>> {
        let tracker = self.current(partition, generation);
        let mut tracker = match tracker.as_deref().map(lock) {
            Some(tracker) if !tracker.revoked => tracker,
            _ => {
                debug!(%partition, offset, "Partition was revoked, dropping completion");
                return Ok(None);
            }
        };

        let state = tracker
            .in_flight
            .get_mut(&offset)
            .ok_or_else(|| unknown(partition, offset))?;
        *state = match completion {
            Completion::Done => RecordState::Done,
            Completion::Failed => RecordState::Failed,
        };

        Ok(self.advance(partition, &mut tracker))
    }

    /// Mark a failed record as finished after it was forwarded by other means.
    pub fn resolve(&self, partition: &Partition, offset: i64) -> Result<Option<i64>> {
        let tracker = self.existing(partition, offset)?;
        let mut tracker = lock(&tracker);

        match tracker.in_flight.get_mut(&offset) {
            Some(state) if *state == RecordState::Failed => *state = RecordState::Done,
            _ => return Err(unknown(partition, offset)),
        }

        Ok(self.advance(partition, &mut tracker))
    }

    /// Stop tracking `partition`. Records still in flight for it are never committed.
    ///
    /// Returns how many registered records were abandoned.
    pub fn revoke(&self, partition: &Partition) -> usize {
        let removed = self
            .partitions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(partition);
        let Some(tracker) = removed else {
            return 0;
        };
        let mut tracker = lock(&tracker);
        tracker.revoked = true;
        let abandoned = tracker.in_flight.len();
        info!(
            %partition,
            watermark = ?tracker.watermark,
            abandoned,
            "Partition revoked"
        );
        abandoned
    }

    /// Whether `generation` is still the live assignment of `partition`.
    pub fn is_current(&self, partition: &Partition, generation: Generation) -> bool {
        self.current(partition, generation).is_some()
    }

    /// Last committed offset for `partition`, if any.
    pub fn watermark(&self, partition: &Partition) -> Option<i64> {
        let partitions = self.partitions.read().unwrap_or_else(PoisonError::into_inner);
        partitions
            .get(partition)
            .and_then(|tracker| lock(tracker).watermark)
    }

    /// Number of registered records not yet folded into a watermark.
    pub fn in_flight(&self) -> usize {
        let partitions = self.partitions.read().unwrap_or_else(PoisonError::into_inner);
        partitions
            .values()
            .map(|tracker| lock(tracker).in_flight.len())
            .sum()
    }

    /// Records currently blocking their partition.
    pub fn failed(&self) -> Vec<(Partition, i64)> {
        let partitions = self.partitions.read().unwrap_or_else(PoisonError::into_inner);
        let mut failed: Vec<_> = partitions
            .iter()
            .flat_map(|(partition, tracker)| {
                lock(tracker)
                    .in_flight
                    .iter()
                    .filter(|(_, state)| **state == RecordState::Failed)
                    .map(|(offset, _)| (partition.clone(), *offset))
                    .collect::<Vec<_>>()
            })
            .collect();
        failed.sort();
        failed
    }

    fn advance(&self, partition: &Partition, tracker: &mut PartitionTracker) -> Option<i64> {
        let watermark = tracker.advance()?;
        debug!(%partition, watermark, "Committing offset");
        if let Err(e) = self.sink.commit(partition, watermark) {
            // A later commit covers this one; the redelivery window just grows.
            warn!(%partition, watermark, "Failed to commit offset: {e}");
        }
        Some(watermark)
    }

    fn tracker(&self, partition: &Partition) -> Arc<Mutex<PartitionTracker>> {
        if let Some(tracker) = self
            .partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(partition)
        {
            return Arc::clone(tracker);
        }
        let mut partitions = self.partitions.write().unwrap_or_else(PoisonError::into_inner);
        let tracker = partitions.entry(partition.clone()).or_insert_with(|| {
            let generation = Generation(self.generations.fetch_add(1, Ordering::Relaxed));
            Arc::new(Mutex::new(PartitionTracker::new(generation)))
        });
        Arc::clone(tracker)
    }

    fn current(
        &self,
        partition: &Partition,
        generation: Generation,
    ) -> Option<Arc<Mutex<PartitionTracker>>> {
        self.partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(partition)
            .filter(|tracker| lock(tracker).generation == generation)
            .cloned()
    }

    fn existing(&self, partition: &Partition, offset: i64) -> Result<Arc<Mutex<PartitionTracker>>> {
        self.partitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(partition)
            .cloned()
            .ok_or_else(|| unknown(partition, offset))
    }
}

fn lock(tracker: &Mutex<PartitionTracker>) -> MutexGuard<'_, PartitionTracker> {
    tracker.lock().unwrap_or_else(PoisonError::into_inner)
}

fn unknown(partition: &Partition, offset: i64) -> Error {
    Error::UnknownRecord {
        partition: partition.clone(),
        offset,
    }
}
