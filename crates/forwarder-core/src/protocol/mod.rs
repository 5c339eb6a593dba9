//! Eventstream wire protocol.
//!
//! Records carry one eventstream operation. Only `insert` produces a task; the
//! group maintenance operations are recognised and decode to nothing.

pub mod headers;
pub mod payload;

use forwarder_types::DecodeError;

/// Queue used when a payload-encoded insert does not name one.
pub const DEFAULT_QUEUE: &str = "post_process_errors";

/// Operations that never produce a task.
const MAINTENANCE_OPERATIONS: &[&str] = &[
    "start_delete_groups",
    "end_delete_groups",
    "start_merge",
    "end_merge",
    "start_unmerge",
    "end_unmerge",
    "start_delete_tag",
    "end_delete_tag",
    "tombstone_events",
    "replace_group",
    "exclude_groups",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Maintenance,
}

impl Operation {
    pub fn parse(operation: &str) -> Result<Self, DecodeError> {
        if operation == "insert" {
            Ok(Self::Insert)
        } else if MAINTENANCE_OPERATIONS.contains(&operation) {
            Ok(Self::Maintenance)
        } else {
            Err(DecodeError::UnexpectedOperation(operation.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_operation() {
        assert_eq!(Operation::parse("insert").unwrap(), Operation::Insert);
        assert_eq!(
            Operation::parse("end_merge").unwrap(),
            Operation::Maintenance
        );
        assert!(matches!(
            Operation::parse("upsert"),
            Err(DecodeError::UnexpectedOperation(op)) if op == "upsert"
        ));
    }
}
