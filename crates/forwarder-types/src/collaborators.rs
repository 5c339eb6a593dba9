//! Interfaces of the forwarder's external collaborators.
//!
//! The forwarder never talks to a broker, a task backend or a flag store
//! directly; it goes through these traits so that each side can be swapped
//! (Kafka in production, in-memory fakes in tests).

use async_trait::async_trait;
use std::time::Duration;

use crate::descriptor::DispatchRequest;
use crate::error::{DispatchError, Result};
use crate::record::{ConsumedRecord, Partition};

/// Supplies records in per-partition consumption order.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Wait for the next record.
    async fn next_record(&self) -> Result<ConsumedRecord>;

    /// Partitions taken away from this consumer since the last call.
    ///
    /// A revoked partition may be handed back later and redelivered from its last
    /// committed offset. Sources without group membership never revoke anything.
    fn take_revoked(&self) -> Vec<Partition> {
        Vec::new()
    }
}

/// Persists consumption progress.
///
/// `offset` is the watermark: the highest offset whose record, and every record
/// before it, has finished forwarding. Calls for one partition arrive in
/// strictly increasing order.
pub trait CommitSink: Send + Sync {
    fn commit(&self, partition: &Partition, offset: i64) -> Result<()>;
}

/// Asynchronous work queue that receives dispatch requests.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Submit a request to the named queue.
    ///
    /// Resolves once the backend has acknowledged the enqueue, not when the task runs.
    async fn enqueue(
        &self,
        queue: &str,
        request: &DispatchRequest,
    ) -> std::result::Result<(), DispatchError>;
}

/// Runtime feature flags. Looked up on every use, never cached by the caller.
pub trait FeatureFlags: Send + Sync {
    /// Unknown keys read as `false`.
    fn get_bool(&self, key: &str) -> bool;
}

/// Metrics sink. Implementations must not fail or block the caller.
pub trait Metrics: Send + Sync {
    fn timing(&self, key: &str, instance: &str, elapsed: Duration);

    fn incr(&self, key: &str, tags: &[(&str, &str)]);
}
