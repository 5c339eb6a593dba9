//! Payload-encoded task descriptors.
//!
//! The record body is a JSON array `[version, operation, data, task_state]`.

use serde::Deserialize;
use serde_json::Value;

use forwarder_types::{DecodeError, GroupState, TaskDescriptor};

use super::Operation;

const SUPPORTED_VERSIONS: &[i64] = &[1, 2];

#[derive(Debug, Deserialize)]
struct InsertData {
    event_id: String,
    project_id: u64,
    #[serde(default)]
    group_id: Option<u64>,
    #[serde(default)]
    primary_hash: Option<String>,
    #[serde(default)]
    occurrence_id: Option<String>,
    #[serde(default)]
    group_states: Option<Vec<GroupState>>,
}

#[derive(Debug, Deserialize)]
struct TaskState {
    is_new: bool,
    #[serde(default)]
    is_regression: Option<bool>,
    is_new_group_environment: bool,
    #[serde(default)]
    skip_consume: bool,
    #[serde(default)]
    queue: Option<String>,
    #[serde(default)]
    group_states: Option<Vec<GroupState>>,
}

/// Decode a task descriptor from a record body.
///
/// An empty body yields `Ok(None)`, as do operations that do not produce a task.
/// Inserts without a queue are addressed to `default_queue`.
pub fn decode(payload: &[u8], default_queue: &str) -> Result<Option<TaskDescriptor>, DecodeError> {
    if payload.is_empty() {
        return Ok(None);
    }

    let message: Vec<Value> = serde_json::from_slice(payload)?;
    let mut parts = message.into_iter();

    let version = parts
        .next()
        .and_then(|v| v.as_i64())
        .ok_or_else(|| DecodeError::InvalidPayload("missing protocol version".to_string()))?;
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(DecodeError::UnsupportedVersion(version));
    }

    let operation = parts
        .next()
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| DecodeError::InvalidPayload("missing operation".to_string()))?;
    if Operation::parse(&operation)? == Operation::Maintenance {
        return Ok(None);
    }

    let data: InsertData = match parts.next() {
        Some(value) => serde_json::from_value(value)?,
        None => return Err(DecodeError::MissingField("data".to_string())),
    };
    let state: TaskState = match parts.next() {
        Some(Value::Null) | None => return Err(DecodeError::MissingField("task_state".to_string())),
        Some(value) => serde_json::from_value(value)?,
    };

    Ok(Some(TaskDescriptor {
        event_id: data.event_id,
        project_id: data.project_id,
        group_id: data.group_id,
        is_new: state.is_new,
        is_regression: state.is_regression,
        is_new_group_environment: state.is_new_group_environment,
        primary_hash: data.primary_hash,
        queue: state.queue.unwrap_or_else(|| default_queue.to_string()),
        skip: state.skip_consume,
        group_states: state.group_states.or(data.group_states),
        occurrence_id: data.occurrence_id,
    }))
}
