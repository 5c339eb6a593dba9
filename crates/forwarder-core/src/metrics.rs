//! Metrics sinks.

use std::time::{Duration, Instant};

use forwarder_types::Metrics;

/// Timer metric shared by both decode paths.
pub const DURATION_METRIC: &str = "eventstream.duration";
pub const SKIPPED_METRIC: &str = "post_process_forwarder.skipped";
pub const DISPATCHED_METRIC: &str = "post_process_forwarder.dispatched";
pub const FAILED_METRIC: &str = "post_process_forwarder.failed";
pub const FALLBACK_METRIC: &str = "post_process_forwarder.header_fallback";

/// Emits metrics as `debug` level tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl Metrics for TracingMetrics {
    fn timing(&self, key: &str, instance: &str, elapsed: Duration) {
        tracing::debug!(
            metric = key,
            instance,
            elapsed_us = elapsed.as_micros() as u64,
            "timing"
        );
    }

    fn incr(&self, key: &str, tags: &[(&str, &str)]) {
        tracing::debug!(metric = key, ?tags, "counter");
    }
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn timing(&self, _key: &str, _instance: &str, _elapsed: Duration) {}

    fn incr(&self, _key: &str, _tags: &[(&str, &str)]) {}
}

/// Run `f` and report how long it took under `key`/`instance`.
pub fn timed<T>(metrics: &dyn Metrics, key: &str, instance: &str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let result = f();
    metrics.timing(key, instance, start.elapsed());
    result
}
