//! Post-process forwarder
//!
//! Consumes event records from a partitioned stream, decodes a task descriptor from
//! each one and enqueues it on a work queue. Offsets are committed per partition in
//! consumption order, so a restart never skips a record that was not forwarded.
//!
//! # Crates
//!
//! - `forwarder_types` - records, descriptors, errors and collaborator traits
//! - `forwarder_core` - decoder, dispatcher, worker pool and offset committer
//! - `post_process_forwarder_kafka` - Kafka consumer and Kafka-backed work queue
//!
//! # CLI Usage
//!
//! ```bash
//! # Forward events to task topics
//! post-process-forwarder forward --brokers localhost:9092 --group-id post-process \
//!   --topic events --queue-topic-prefix tasks. --use-kafka-headers
//!
//! # Decode a single record offline
//! post-process-forwarder decode --headers version=2 --headers operation=insert ...
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use forwarder_core::{
    DecodeStrategy, Decoder, FeatureFlags, FileFlags, ForwarderConfig, NoopMetrics, StaticFlags,
    KAFKA_HEADERS_FLAG,
};
use forwarder_types::{ConsumedRecord, Header, Partition, TaskDescriptor};
use post_process_forwarder_kafka::{ConsumerConfig, ProducerConfig};

pub mod runner;

pub use runner::{build_pool, run_forwarder, RunOptions, RunSummary};

#[derive(Parser, Clone, Debug)]
pub struct KafkaOpts {
    /// Kafka brokers (comma-separated)
    #[arg(long, default_value = "localhost:9092", env = "KAFKA_BROKERS")]
    pub brokers: String,

    /// Consumer group ID
    #[arg(long, default_value = "post-process-forwarder")]
    pub group_id: String,

    /// Topic carrying the events to forward
    #[arg(long, default_value = "events")]
    pub topic: String,

    /// Where to start when the group has no committed offset
    #[arg(long, default_value = "latest")]
    pub auto_offset_reset: String,

    /// Session timeout in milliseconds
    #[arg(long, default_value = "6000")]
    pub session_timeout_ms: String,

    /// Prefix of the topics that act as work queues
    #[arg(long, default_value = "tasks.")]
    pub queue_topic_prefix: String,

    /// Delivery timeout for enqueued tasks in milliseconds
    #[arg(long, default_value = "5000")]
    pub message_timeout_ms: String,
}

impl KafkaOpts {
    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            brokers: self.brokers.clone(),
            group_id: self.group_id.clone(),
            topics: vec![self.topic.clone()],
            auto_offset_reset: self.auto_offset_reset.clone(),
            session_timeout_ms: self.session_timeout_ms.clone(),
        }
    }

    pub fn producer_config(&self) -> ProducerConfig {
        ProducerConfig {
            brokers: self.brokers.clone(),
            topic_prefix: self.queue_topic_prefix.clone(),
            message_timeout_ms: self.message_timeout_ms.clone(),
            ..Default::default()
        }
    }
}

#[derive(Parser, Clone, Debug)]
pub struct FlagOpts {
    /// TOML file of boolean feature flags, re-read periodically
    #[arg(long, env = "FORWARDER_FLAGS_FILE")]
    pub flags_file: Option<PathBuf>,

    /// Seconds between re-reads of the flags file
    #[arg(long, default_value_t = 30)]
    pub flags_refresh_secs: u64,

    /// Decode from record headers before falling back to the payload.
    /// Ignored when a flags file is given.
    #[arg(long)]
    pub use_kafka_headers: bool,
}

impl FlagOpts {
    /// Build the flag store. A file-backed store also gets a refresh task.
    pub fn build(&self) -> anyhow::Result<(Arc<dyn FeatureFlags>, Option<JoinHandle<()>>)> {
        match &self.flags_file {
            Some(path) => {
                let file_flags = Arc::new(FileFlags::load(path)?);
                let refresh = file_flags
                    .spawn_refresh(Duration::from_secs(self.flags_refresh_secs.max(1)));
                let flags: Arc<dyn FeatureFlags> = file_flags;
                Ok((flags, Some(refresh)))
            }
            None => {
                let flags: Arc<dyn FeatureFlags> =
                    Arc::new(StaticFlags::new().with(KAFKA_HEADERS_FLAG, self.use_kafka_headers));
                Ok((flags, None))
            }
        }
    }
}

#[derive(Parser, Clone, Debug)]
pub struct ForwardArgs {
    #[command(flatten)]
    pub kafka: KafkaOpts,

    #[command(flatten)]
    pub forwarder: ForwarderConfig,

    #[command(flatten)]
    pub flags: FlagOpts,

    /// Stop after submitting this many records
    #[arg(long)]
    pub max_records: Option<u64>,
}

/// Parse `KEY=VALUE` into a header. A bare `KEY` is a header with no value.
pub fn parse_header_arg(arg: &str) -> Result<Header, String> {
    let (key, value) = match arg.split_once('=') {
        Some((key, value)) => (key, Some(value.as_bytes().to_vec())),
        None => (arg, None),
    };
    if key.is_empty() {
        return Err(format!("header '{arg}' has an empty key"));
    }
    Ok(Header {
        key: key.to_string(),
        value,
    })
}

/// Decode one hand-built record the way the forwarder would.
pub fn decode_offline(
    headers: Vec<Header>,
    payload: Option<&str>,
    strategy: DecodeStrategy,
    default_queue: &str,
) -> anyhow::Result<Option<TaskDescriptor>> {
    let decoder = Decoder::new(Arc::new(StaticFlags::new()), Arc::new(NoopMetrics), default_queue);

    let mut record = ConsumedRecord::new(
        Partition::new("offline", 0),
        0,
        payload.unwrap_or_default().as_bytes(),
    );
    record.headers = headers;

    let descriptor = decoder.decode_with(strategy, &record)?;
    Ok(descriptor)
}
