//! Metrics sinks.

/// Accepts named counters. Implementations must never block or fail the pipeline.
pub trait MetricsSink: Send + Sync {
    fn record_count(&self, name: &str, value: u64, unit: &str);
}

/// Emits each counter as a structured `tracing` event.
#[derive(Debug, Default)]
pub struct TracingMetrics;

impl TracingMetrics {
    pub fn new() -> Self {
        Self
    }
}

impl MetricsSink for TracingMetrics {
    fn record_count(&self, name: &str, value: u64, unit: &str) {
        tracing::info!(metric = name, value, unit, "Metric recorded");
    }
}
