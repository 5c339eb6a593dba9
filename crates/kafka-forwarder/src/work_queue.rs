use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use tracing::debug;

use forwarder_types::{DispatchError, DispatchRequest, WorkQueue};

use crate::error::{Error, Result};

/// Configuration for the producer that publishes dispatched tasks.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Kafka brokers (comma-separated list)
    pub brokers: String,
    /// Prepended to the queue name to form the destination topic
    pub topic_prefix: String,
    /// Delivery timeout in milliseconds
    pub message_timeout_ms: String,
    /// How long `send` may wait for room in the local producer queue
    pub queue_timeout: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            topic_prefix: "tasks.".to_string(),
            message_timeout_ms: "5000".to_string(),
            queue_timeout: Duration::from_secs(0),
        }
    }
}

/// Topic that carries the tasks for `queue`.
pub fn topic_for_queue(prefix: &str, queue: &str) -> String {
    format!("{prefix}{queue}")
}

/// Work queue backed by Kafka topics, one topic per named queue.
///
/// Requests are JSON encoded and keyed by their cache key, so every task for
/// the same event lands on the same partition.
pub struct KafkaWorkQueue {
    producer: FutureProducer,
    config: ProducerConfig,
}

impl KafkaWorkQueue {
    pub fn new(config: ProducerConfig) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", &config.message_timeout_ms)
            .create()
            .map_err(|e| Error::Producer(format!("Failed to create Kafka producer: {e}")))?;

        Ok(Self { producer, config })
    }

    pub fn topic_for(&self, queue: &str) -> String {
        topic_for_queue(&self.config.topic_prefix, queue)
    }
}

#[async_trait]
impl WorkQueue for KafkaWorkQueue {
    async fn enqueue(
        &self,
        queue: &str,
        request: &DispatchRequest,
    ) -> std::result::Result<(), DispatchError> {
        let topic = self.topic_for(queue);
        let payload = serde_json::to_vec(request)?;

        let record = FutureRecord::to(&topic)
            .payload(&payload)
            .key(&request.cache_key);

        let (partition, offset) = self
            .producer
            .send(record, self.config.queue_timeout)
            .await
            .map_err(|(e, _)| DispatchError::Enqueue {
                queue: queue.to_string(),
                message: e.to_string(),
            })?;

        debug!(
            topic = %topic,
            cache_key = %request.cache_key,
            partition,
            offset,
            "Task published"
        );
        Ok(())
    }
}
