//! Header-encoded task descriptors.
//!
//! Every field travels as a UTF-8 header value. Integers are decimal strings and
//! booleans are integers (`0` is false, anything else true).

use std::collections::HashMap;

use forwarder_types::{DecodeError, GroupState, Header, TaskDescriptor};

use super::Operation;

/// The only version carried on the header path.
const HEADER_VERSION: i64 = 2;

struct HeaderMap<'a>(HashMap<&'a str, Option<&'a [u8]>>);

impl<'a> HeaderMap<'a> {
    fn new(headers: &'a [Header]) -> Self {
        // Later duplicates overwrite earlier ones.
        Self(
            headers
                .iter()
                .map(|h| (h.key.as_str(), h.value.as_deref()))
                .collect(),
        )
    }

    fn required(&self, key: &str) -> Result<&'a [u8], DecodeError> {
        match self.0.get(key) {
            Some(Some(value)) => Ok(value),
            _ => Err(DecodeError::MissingHeader(key.to_string())),
        }
    }

    fn optional(&self, key: &str) -> Option<&'a [u8]> {
        self.0.get(key).copied().flatten()
    }

    fn str(&self, key: &str) -> Result<&'a str, DecodeError> {
        decode_str(key, self.required(key)?)
    }

    fn int(&self, key: &str) -> Result<i64, DecodeError> {
        decode_int(key, self.required(key)?)
    }

    fn bool(&self, key: &str) -> Result<bool, DecodeError> {
        Ok(self.int(key)? != 0)
    }

    fn optional_str(&self, key: &str) -> Result<Option<&'a str>, DecodeError> {
        self.optional(key).map(|v| decode_str(key, v)).transpose()
    }

    fn optional_id(&self, key: &str) -> Result<Option<u64>, DecodeError> {
        self.optional(key)
            .map(|v| decode_int(key, v).and_then(|n| to_id(key, n)))
            .transpose()
    }
}

fn decode_str<'a>(key: &str, value: &'a [u8]) -> Result<&'a str, DecodeError> {
    std::str::from_utf8(value).map_err(|e| DecodeError::InvalidHeader {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn decode_int(key: &str, value: &[u8]) -> Result<i64, DecodeError> {
    decode_str(key, value)?
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| DecodeError::InvalidHeader {
            key: key.to_string(),
            message: e.to_string(),
        })
}

fn to_id(key: &str, value: i64) -> Result<u64, DecodeError> {
    u64::try_from(value).map_err(|_| DecodeError::InvalidHeader {
        key: key.to_string(),
        message: format!("expected a non-negative id, got {value}"),
    })
}

/// Decode a task descriptor from record headers.
///
/// Returns `Ok(None)` for operations that do not produce a task.
pub fn decode(headers: &[Header]) -> Result<Option<TaskDescriptor>, DecodeError> {
    let headers = HeaderMap::new(headers);

    let version = headers.int("version")?;
    let operation = Operation::parse(headers.str("operation")?)?;

    if operation == Operation::Maintenance {
        return Ok(None);
    }
    if version != HEADER_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }

    let group_states = headers
        .optional_str("group_states")?
        .map(serde_json::from_str::<Vec<GroupState>>)
        .transpose()?;

    Ok(Some(TaskDescriptor {
        event_id: headers.str("event_id")?.to_string(),
        project_id: to_id("project_id", headers.int("project_id")?)?,
        group_id: headers.optional_id("group_id")?,
        is_new: headers.bool("is_new")?,
        is_regression: Some(headers.bool("is_regression")?),
        is_new_group_environment: headers.bool("is_new_group_environment")?,
        primary_hash: headers.optional_str("primary_hash")?.map(str::to_string),
        queue: headers.str("queue")?.to_string(),
        skip: headers.bool("skip_consume")?,
        group_states,
        occurrence_id: headers.optional_str("occurrence_id")?.map(str::to_string),
    }))
}
