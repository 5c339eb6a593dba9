//! Consumer callbacks: partition revocation and asynchronous commit results.

use std::sync::{Mutex, PoisonError};

use rdkafka::consumer::{ConsumerContext, Rebalance};
use rdkafka::error::KafkaResult;
use rdkafka::{ClientContext, TopicPartitionList};
use tracing::{info, warn};

use forwarder_types::Partition;

/// Collects revoked partitions for the intake loop and reports failed commits.
///
/// Callbacks run on the consumer's polling path, so they only record and log.
#[derive(Debug, Default)]
pub struct ForwarderContext {
    revoked: Mutex<Vec<Partition>>,
}

impl ForwarderContext {
    /// Drain the partitions revoked since the last call.
    pub fn take_revoked(&self) -> Vec<Partition> {
        std::mem::take(&mut *self.revoked.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn record_revoked(&self, tpl: &TopicPartitionList) {
        let partitions = partitions(tpl);
        info!(partitions = ?partitions, "Partitions revoked");
        self.revoked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(partitions);
    }
}

impl ClientContext for ForwarderContext {}

impl ConsumerContext for ForwarderContext {
    fn pre_rebalance(&self, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Revoke(tpl) => self.record_revoked(tpl),
            Rebalance::Assign(_) => {}
            Rebalance::Error(e) => warn!("Rebalance failed: {e}"),
        }
    }

    fn post_rebalance(&self, rebalance: &Rebalance<'_>) {
        if let Rebalance::Assign(tpl) = rebalance {
            info!(partitions = ?partitions(tpl), "Partitions assigned");
        }
    }

    fn commit_callback(&self, result: KafkaResult<()>, offsets: &TopicPartitionList) {
        for (partition, watermark, reason) in commit_failures(&result, offsets) {
            // A later commit covers this one; the redelivery window just grows.
            warn!(%partition, watermark = ?watermark, "Broker rejected offset commit: {reason}");
        }
    }
}

fn partitions(tpl: &TopicPartitionList) -> Vec<Partition> {
    tpl.elements()
        .iter()
        .map(|elem| Partition::new(elem.topic(), elem.partition()))
        .collect()
}

/// Partitions whose commit failed, with the watermark that was being committed.
///
/// A request-level error fails every partition in the request.
fn commit_failures(
    result: &KafkaResult<()>,
    offsets: &TopicPartitionList,
) -> Vec<(Partition, Option<i64>, String)> {
    offsets
        .elements()
        .iter()
        .filter_map(|elem| {
            let reason = match (result, elem.error()) {
                (Err(e), _) => e.to_string(),
                (Ok(()), Err(e)) => e.to_string(),
                (Ok(()), Ok(())) => return None,
            };
            // Kafka stores the next offset to read.
            let watermark = elem.offset().to_raw().map(|next| next - 1);
            Some((Partition::new(elem.topic(), elem.partition()), watermark, reason))
        })
        .collect()
}
