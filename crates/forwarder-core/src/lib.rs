//! Forwarding core for post-process-forwarder.
//!
//! This crate provides:
//! - Descriptor decoding from header-encoded or payload-encoded records
//! - Dispatch of decoded tasks to a work queue
//! - A bounded worker pool with backpressure
//! - Per-partition offset commits in consumption order
//!
//! # Pipeline
//!
//! Records are submitted to the [`ForwardingPool`] in consumption order. Each one is
//! registered with the [`OffsetCommitter`], decoded by the [`Decoder`] and handed to
//! the [`Dispatcher`] on one of the pool's workers. Completions flow back to the
//! committer, which only ever commits the lowest contiguous run of finished offsets.
//!
//! # Dependency Direction
//!
//! This crate depends on `forwarder-types` for records, descriptors and collaborator
//! traits. Kafka adapters live in `post-process-forwarder-kafka`.

/// Ordered per-partition offset tracking
pub mod committer;
pub mod config;

/// Two-strategy record decoding with payload fallback
pub mod decoder;
pub mod dispatcher;
pub mod flags;
pub mod metrics;

/// Bounded worker pool driving decode and dispatch
pub mod pool;
pub mod protocol;
pub mod testing;

// Re-export from forwarder-types for convenience
pub use forwarder_types::{
    CommitSink, ConsumedRecord, DispatchRequest, Error, FeatureFlags, Metrics, Partition,
    RecordSource, Result, TaskDescriptor, WorkQueue,
};

pub use committer::{Completion, Generation, OffsetCommitter};
pub use config::ForwarderConfig;
pub use decoder::{DecodeStrategy, Decoder, KAFKA_HEADERS_FLAG};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use flags::{FileFlags, StaticFlags};
pub use metrics::{NoopMetrics, TracingMetrics};
pub use pool::{ForwardingPool, PoolConfig, RecordFailure, ShutdownReport};
