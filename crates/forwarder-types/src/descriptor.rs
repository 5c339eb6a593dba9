//! Task descriptors and the payload handed to the work queue.

use serde::{Deserialize, Serialize};

/// Per-group state attached to events that touch several groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupState {
    pub id: u64,
    pub is_new: bool,
    pub is_regression: bool,
    pub is_new_group_environment: bool,
}

/// Task parameters decoded from one record.
///
/// A descriptor has no lifecycle of its own: it is handed to the dispatcher
/// right after decoding and dropped afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub event_id: String,
    pub project_id: u64,
    pub group_id: Option<u64>,
    pub is_new: bool,
    pub is_regression: Option<bool>,
    pub is_new_group_environment: bool,
    pub primary_hash: Option<String>,
    /// Work queue the task is addressed to
    pub queue: String,
    /// Forwarding is suppressed for this event
    pub skip: bool,
    pub group_states: Option<Vec<GroupState>>,
    pub occurrence_id: Option<String>,
}

impl TaskDescriptor {
    /// Cache key the downstream task uses to fetch the full event.
    pub fn cache_key(&self) -> String {
        cache_key_for_event(self.project_id, &self.event_id)
    }
}

/// Compute the event cache key for `(project_id, event_id)`.
///
/// The project id is numeric and always last, so splitting on the final `:`
/// recovers both inputs and distinct inputs never share a key.
pub fn cache_key_for_event(project_id: u64, event_id: &str) -> String {
    format!("e:{event_id}:{project_id}")
}

/// Payload submitted to the work queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub is_new: bool,
    pub is_regression: Option<bool>,
    pub is_new_group_environment: bool,
    pub primary_hash: Option<String>,
    pub cache_key: String,
    pub group_id: Option<u64>,
    pub group_states: Option<Vec<GroupState>>,
    pub occurrence_id: Option<String>,
}

impl From<&TaskDescriptor> for DispatchRequest {
    fn from(descriptor: &TaskDescriptor) -> Self {
        Self {
            is_new: descriptor.is_new,
            is_regression: descriptor.is_regression,
            is_new_group_environment: descriptor.is_new_group_environment,
            primary_hash: descriptor.primary_hash.clone(),
            cache_key: descriptor.cache_key(),
            group_id: descriptor.group_id,
            group_states: descriptor.group_states.clone(),
            occurrence_id: descriptor.occurrence_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> TaskDescriptor {
        TaskDescriptor {
            event_id: "e1".to_string(),
            project_id: 7,
            group_id: Some(42),
            is_new: true,
            is_regression: Some(false),
            is_new_group_environment: true,
            primary_hash: None,
            queue: "q1".to_string(),
            skip: false,
            group_states: None,
            occurrence_id: None,
        }
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        assert_eq!(cache_key_for_event(7, "e1"), "e:e1:7");
        assert_eq!(cache_key_for_event(7, "e1"), cache_key_for_event(7, "e1"));
    }

    #[test]
    fn test_cache_key_differs_for_different_inputs() {
        let base = cache_key_for_event(7, "e1");
        assert_ne!(base, cache_key_for_event(8, "e1"));
        assert_ne!(base, cache_key_for_event(7, "e2"));
        // An event id containing the separator must not collide with a shorter id.
        assert_ne!(cache_key_for_event(12, "a"), cache_key_for_event(2, "a:1"));
    }

    #[test]
    fn test_dispatch_request_from_descriptor() {
        let request = DispatchRequest::from(&descriptor());

        assert_eq!(request.cache_key, "e:e1:7");
        assert_eq!(request.group_id, Some(42));
        assert!(request.is_new);
        assert_eq!(request.is_regression, Some(false));
        assert!(request.is_new_group_environment);
        assert_eq!(request.primary_hash, None);
    }

    #[test]
    fn test_dispatch_request_json_shape() {
        let json = serde_json::to_value(DispatchRequest::from(&descriptor())).unwrap();
        let obj = json.as_object().unwrap();

        assert_eq!(obj.len(), 8);
        assert_eq!(obj["cache_key"], "e:e1:7");
        assert!(obj["primary_hash"].is_null());
        assert!(obj["group_states"].is_null());
    }
}
