//! Consumed log records.
//!
//! High-level wrappers for records read from the partitioned log. The transport
//! owns their creation; everything downstream only reads them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single partition of a topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Partition {
    /// Topic name
    pub topic: String,
    /// Partition number within the topic
    pub index: i32,
}

impl Partition {
    pub fn new(topic: impl Into<String>, index: i32) -> Self {
        Self {
            topic: topic.into(),
            index,
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.topic, self.index)
    }
}

/// A record header. Values may be null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub key: String,
    pub value: Option<Vec<u8>>,
}

/// A record consumed from the log, with its position.
#[derive(Debug, Clone)]
pub struct ConsumedRecord {
    /// Partition the record was read from
    pub partition: Partition,
    /// Offset within the partition
    pub offset: i64,
    /// Record body (tombstones have none)
    pub payload: Option<Vec<u8>>,
    /// Record headers in wire order
    pub headers: Vec<Header>,
    /// Record timestamp in milliseconds since epoch (if available)
    pub timestamp: Option<i64>,
}

impl ConsumedRecord {
    pub fn new(partition: Partition, offset: i64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            partition,
            offset,
            payload: Some(payload.into()),
            headers: Vec::new(),
            timestamp: None,
        }
    }

    /// Builder-style helper, mostly for tests and the offline decode command.
    pub fn with_header(mut self, key: impl Into<String>, value: Option<&[u8]>) -> Self {
        self.headers.push(Header {
            key: key.into(),
            value: value.map(<[u8]>::to_vec),
        });
        self
    }

    /// Record body, or an empty slice for tombstones.
    pub fn payload(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or_default()
    }
}
