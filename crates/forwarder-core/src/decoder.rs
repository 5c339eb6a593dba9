use std::sync::Arc;

use tracing::warn;

use forwarder_types::{ConsumedRecord, DecodeError, FeatureFlags, Metrics, TaskDescriptor};

use crate::metrics::{timed, DURATION_METRIC, FALLBACK_METRIC};
use crate::protocol::{headers, payload};

/// Flag that makes header decoding the preferred path.
pub const KAFKA_HEADERS_FLAG: &str = "post-process-forwarder:kafka-headers";

/// How a record is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// Decode headers; on failure fall back to the payload.
    HeadersWithPayloadFallback,
    /// Decode the payload only.
    PayloadOnly,
}

impl DecodeStrategy {
    pub fn from_flag(use_headers: bool) -> Self {
        if use_headers {
            Self::HeadersWithPayloadFallback
        } else {
            Self::PayloadOnly
        }
    }
}

/// Turns consumed records into task descriptors.
///
/// The decoder holds no mutable state. The strategy is read from the flag
/// store on every call so flag flips take effect without a restart.
#[derive(Clone)]
pub struct Decoder {
    flags: Arc<dyn FeatureFlags>,
    metrics: Arc<dyn Metrics>,
    default_queue: String,
}

impl Decoder {
    pub fn new(
        flags: Arc<dyn FeatureFlags>,
        metrics: Arc<dyn Metrics>,
        default_queue: impl Into<String>,
    ) -> Self {
        Self {
            flags,
            metrics,
            default_queue: default_queue.into(),
        }
    }

    pub fn strategy(&self) -> DecodeStrategy {
        DecodeStrategy::from_flag(self.flags.get_bool(KAFKA_HEADERS_FLAG))
    }

    /// Decode one record.
    ///
    /// `Ok(None)` means the record carries no task; it still counts as processed.
    /// Header failures are recovered by decoding the payload; only a payload that
    /// cannot be decoded is returned as an error.
    pub fn decode(&self, record: &ConsumedRecord) -> Result<Option<TaskDescriptor>, DecodeError> {
        self.decode_with(self.strategy(), record)
    }

    pub fn decode_with(
        &self,
        strategy: DecodeStrategy,
        record: &ConsumedRecord,
    ) -> Result<Option<TaskDescriptor>, DecodeError> {
        match strategy {
            DecodeStrategy::HeadersWithPayloadFallback => {
                match timed(self.metrics.as_ref(), DURATION_METRIC, "headers", || {
                    headers::decode(&record.headers)
                }) {
                    Ok(descriptor) => Ok(descriptor),
                    Err(error) => {
                        warn!(
                            partition = %record.partition,
                            offset = record.offset,
                            "Could not decode message headers, falling back to payload: {error}"
                        );
                        self.metrics.incr(FALLBACK_METRIC, &[]);
                        self.decode_payload(record)
                    }
                }
            }
            DecodeStrategy::PayloadOnly => self.decode_payload(record),
        }
    }

    fn decode_payload(&self, record: &ConsumedRecord) -> Result<Option<TaskDescriptor>, DecodeError> {
        timed(self.metrics.as_ref(), DURATION_METRIC, "payload", || {
            payload::decode(record.payload(), &self.default_queue)
        })
    }
}
