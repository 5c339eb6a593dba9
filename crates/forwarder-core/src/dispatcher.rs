//! Submits decoded descriptors to the work queue.

use std::sync::Arc;

use tracing::{debug, info};

use forwarder_types::{DispatchError, DispatchRequest, Metrics, TaskDescriptor, WorkQueue};

use crate::metrics::{DISPATCHED_METRIC, SKIPPED_METRIC};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The work queue acknowledged the request.
    Enqueued,
    /// Forwarding is suppressed for this event; nothing was enqueued.
    Skipped,
}

#[derive(Clone)]
pub struct Dispatcher {
    queue: Arc<dyn WorkQueue>,
    metrics: Arc<dyn Metrics>,
}

impl Dispatcher {
    pub fn new(queue: Arc<dyn WorkQueue>, metrics: Arc<dyn Metrics>) -> Self {
        Self { queue, metrics }
    }

    /// Forward one descriptor.
    ///
    /// Only waits for the enqueue acknowledgement, never for the task itself.
    pub async fn dispatch(
        &self,
        descriptor: &TaskDescriptor,
    ) -> Result<DispatchOutcome, DispatchError> {
        if descriptor.skip {
            info!(event_id = %descriptor.event_id, "post_process.skip.raw_event");
            self.metrics
                .incr(SKIPPED_METRIC, &[("queue", descriptor.queue.as_str())]);
            return Ok(DispatchOutcome::Skipped);
        }

        let request = DispatchRequest::from(descriptor);
        self.queue.enqueue(&descriptor.queue, &request).await?;

        debug!(
            event_id = %descriptor.event_id,
            queue = %descriptor.queue,
            cache_key = %request.cache_key,
            "Enqueued post-process task"
        );
        self.metrics
            .incr(DISPATCHED_METRIC, &[("queue", descriptor.queue.as_str())]);
        Ok(DispatchOutcome::Enqueued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{descriptor, RecordingMetrics, RecordingQueue};

    fn dispatcher() -> (Dispatcher, Arc<RecordingQueue>, Arc<RecordingMetrics>) {
        let queue = Arc::new(RecordingQueue::default());
        let metrics = Arc::new(RecordingMetrics::default());
        (
            Dispatcher::new(queue.clone(), metrics.clone()),
            queue,
            metrics,
        )
    }

    #[tokio::test]
    async fn test_dispatch_enqueues_request() {
        let (dispatcher, queue, metrics) = dispatcher();

        let outcome = dispatcher.dispatch(&descriptor("e1", 7, "q1")).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Enqueued);
        let calls = queue.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "q1");
        assert_eq!(calls[0].1.cache_key, "e:e1:7");
        assert_eq!(calls[0].1.group_id, Some(42));
        assert_eq!(metrics.count(DISPATCHED_METRIC), 1);
    }

    #[tokio::test]
    async fn test_skip_suppresses_enqueue() {
        let (dispatcher, queue, metrics) = dispatcher();
        let mut skipped = descriptor("raw", 1, "q1");
        skipped.skip = true;

        let outcome = dispatcher.dispatch(&skipped).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Skipped);
        assert!(queue.calls().is_empty());
        assert_eq!(metrics.count(SKIPPED_METRIC), 1);
        assert_eq!(metrics.count(DISPATCHED_METRIC), 0);
    }

    #[tokio::test]
    async fn test_enqueue_failure_is_returned() {
        let (dispatcher, queue, metrics) = dispatcher();
        queue.fail_next(1);

        let err = dispatcher
            .dispatch(&descriptor("e1", 7, "q1"))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Enqueue { queue, .. } if queue == "q1"));
        assert_eq!(metrics.count(DISPATCHED_METRIC), 0);
    }
}
