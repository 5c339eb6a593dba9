use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer as RdkafkaConsumer, StreamConsumer};
use rdkafka::message::{Headers, Message as RdkafkaMessage};
use rdkafka::{Offset, TopicPartitionList};
use tracing::{debug, info};

use forwarder_types::{CommitSink, ConsumedRecord, Header, Partition, RecordSource};

use crate::context::ForwarderContext;
use crate::error::{Error, Result};

/// Configuration for the Kafka consumer side.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Kafka brokers (comma-separated list)
    pub brokers: String,
    /// Consumer group ID
    pub group_id: String,
    /// Topics to consume from
    pub topics: Vec<String>,
    /// Auto offset reset strategy ("earliest" or "latest")
    ///
    /// Only applies when the group has no committed offset for a partition.
    pub auto_offset_reset: String,
    /// Session timeout in milliseconds
    pub session_timeout_ms: String,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            group_id: "post-process-forwarder".to_string(),
            topics: vec!["events".to_string()],
            auto_offset_reset: "latest".to_string(),
            session_timeout_ms: "6000".to_string(),
        }
    }
}

impl ConsumerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.topics.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one topic is required".to_string(),
            ));
        }
        match self.auto_offset_reset.as_str() {
            "earliest" | "latest" | "error" => Ok(()),
            other => Err(Error::InvalidConfig(format!(
                "unknown auto offset reset '{other}'"
            ))),
        }
    }

    /// librdkafka settings. Offsets are only ever committed by the forwarder.
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("session.timeout.ms", &self.session_timeout_ms)
            .set("enable.partition.eof", "false");
        config
    }
}

/// Kafka consumer that feeds the forwarder and persists its watermarks.
///
/// Commits are asynchronous; the broker's verdict arrives in
/// [`ForwarderContext`], which also reports partitions lost in a rebalance.
pub struct KafkaTransport {
    consumer: StreamConsumer<ForwarderContext>,
}

impl KafkaTransport {
    /// Create the consumer and subscribe to the configured topics.
    pub fn new(config: ConsumerConfig) -> Result<Self> {
        config.validate()?;

        let consumer: StreamConsumer<ForwarderContext> = config
            .client_config()
            .create_with_context(ForwarderContext::default())
            .map_err(|e| Error::Consumer(format!("Failed to create consumer: {e}")))?;

        let topics: Vec<&str> = config.topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topics)
            .map_err(|e| Error::Consumer(format!("Failed to subscribe to topics: {e}")))?;

        info!(
            brokers = %config.brokers,
            group_id = %config.group_id,
            topics = ?config.topics,
            "Kafka consumer subscribed"
        );

        Ok(Self { consumer })
    }
}

#[async_trait]
impl RecordSource for KafkaTransport {
    async fn next_record(&self) -> forwarder_types::Result<ConsumedRecord> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| Error::Consumer(format!("Error receiving message: {e}")))?;
        Ok(to_record(&message))
    }

    fn take_revoked(&self) -> Vec<Partition> {
        self.consumer.context().take_revoked()
    }
}

impl CommitSink for KafkaTransport {
    fn commit(&self, partition: &Partition, offset: i64) -> forwarder_types::Result<()> {
        // Kafka stores the next offset to read, not the last one processed.
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&partition.topic, partition.index, Offset::Offset(offset + 1))
            .map_err(Error::Kafka)?;

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(Error::Kafka)?;

        debug!(%partition, offset, "Offset commit requested");
        Ok(())
    }
}

/// Copy a Kafka message into a [`ConsumedRecord`].
pub fn to_record<M: RdkafkaMessage>(message: &M) -> ConsumedRecord {
    let headers = message
        .headers()
        .map(|headers| {
            headers
                .iter()
                .map(|h| Header {
                    key: h.key.to_string(),
                    value: h.value.map(<[u8]>::to_vec),
                })
                .collect()
        })
        .unwrap_or_default();

    ConsumedRecord {
        partition: Partition::new(message.topic(), message.partition()),
        offset: message.offset(),
        payload: message.payload().map(<[u8]>::to_vec),
        headers,
        timestamp: message.timestamp().to_millis(),
    }
}
