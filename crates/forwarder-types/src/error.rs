//! Error types for the forwarder.

use crate::record::Partition;
use thiserror::Error;

/// Errors raised while decoding a record into a task descriptor.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Missing header: {0}")]
    MissingHeader(String),

    #[error("Invalid header '{key}': {message}")]
    InvalidHeader { key: String, message: String },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Unsupported version: {0}")]
    UnsupportedVersion(i64),

    #[error("Unexpected operation: {0}")]
    UnexpectedOperation(String),

    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while submitting work to the work queue.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Enqueue to '{queue}' failed: {message}")]
    Enqueue { queue: String, message: String },

    #[error("Failed to serialize dispatch request: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors surfaced by the forwarding pipeline.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Worker panicked: {0}")]
    WorkerPanic(String),

    #[error("Offset {offset} on {partition} is not after the last registered offset {last}")]
    OffsetRegression {
        partition: Partition,
        offset: i64,
        last: i64,
    },

    #[error("No in-flight record at offset {offset} on {partition}")]
    UnknownRecord { partition: Partition, offset: i64 },

    #[error("Commit error: {0}")]
    Commit(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Forwarding pool is shut down")]
    PoolClosed,
}

/// Result type alias for forwarder operations.
pub type Result<T> = std::result::Result<T, Error>;
