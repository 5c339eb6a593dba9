//! Kafka transport for the post-process forwarder.
//!
//! - [`KafkaTransport`] consumes event records and commits the forwarder's watermarks
//! - [`KafkaWorkQueue`] publishes dispatched tasks to per-queue topics

/// Rebalance and commit callbacks
pub mod context;
/// Consumer side: record source and offset commits
pub mod transport;
/// Producer side: the work queue
pub mod work_queue;
pub mod error;

pub use context::ForwarderContext;
pub use error::{Error, Result};
pub use transport::{to_record, ConsumerConfig, KafkaTransport};
pub use work_queue::{topic_for_queue, KafkaWorkQueue, ProducerConfig};
