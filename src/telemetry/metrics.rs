//! Outcome reporting for batches and individual requests.
//!
//! The engine reports through the `MetricsSink` trait. The default sink
//! forwards to the `metrics` crate facade, so any installed recorder
//! (Prometheus, statsd, ...) picks the values up; without a recorder the
//! calls are no-ops.

use std::time::Duration;

use serde::Serialize;

use crate::scheduler::Priority;

/// How a request was ultimately served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPath {
    /// Answered from the result cache.
    Cache,
    /// Went through the queue and a batch.
    Batched,
    /// Answered by the dedicated low-latency call.
    RealTime,
    /// Low-latency call failed; answered by the standard call.
    RealTimeFallback,
}

impl RequestPath {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Batched => "batched",
            Self::RealTime => "real_time",
            Self::RealTimeFallback => "real_time_fallback",
        }
    }
}

/// Summary of one completed batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub batch_size: usize,
    pub real_time_count: usize,
    pub normal_count: usize,
    pub latency: Duration,
    /// True when no item in the batch failed.
    pub success: bool,
    pub failed_count: usize,
}

/// Summary of one settled request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestOutcome {
    pub priority: Priority,
    pub path: RequestPath,
    /// From submission (or enqueue) to settlement.
    pub latency: Duration,
    pub success: bool,
}

/// Receiver of engine outcomes.
pub trait MetricsSink: Send + Sync + 'static {
    /// Called exactly once per completed batch.
    fn record_batch(&self, outcome: &BatchOutcome);

    /// Called once per settled request.
    fn record_request(&self, _outcome: &RequestOutcome) {}
}

/// Sink forwarding outcomes to the `metrics` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsFacadeSink;

impl MetricsSink for MetricsFacadeSink {
    fn record_batch(&self, outcome: &BatchOutcome) {
        let status = if outcome.success { "ok" } else { "partial" };
        metrics::counter!("analysis_batches_total", "status" => status).increment(1);
        metrics::histogram!("analysis_batch_latency_ms").record(duration_ms(outcome.latency));
        metrics::histogram!("analysis_batch_size").record(outcome.batch_size as f64);
        if outcome.real_time_count > 0 {
            metrics::counter!("analysis_batch_real_time_items_total")
                .increment(outcome.real_time_count as u64);
        }
        if outcome.failed_count > 0 {
            metrics::counter!("analysis_batch_failed_items_total")
                .increment(outcome.failed_count as u64);
        }
    }

    fn record_request(&self, outcome: &RequestOutcome) {
        let status = if outcome.success { "ok" } else { "error" };
        metrics::counter!(
            "analysis_requests_total",
            "path" => outcome.path.as_str(),
            "priority" => outcome.priority.as_str(),
            "status" => status
        )
        .increment(1);
        metrics::histogram!("analysis_request_latency_ms", "path" => outcome.path.as_str())
            .record(duration_ms(outcome.latency));
    }
}

/// Publish the current queue depth.
pub fn record_queue_depth(depth: usize) {
    metrics::gauge!("analysis_queue_depth").set(depth as f64);
}

/// Publish the current sizing targets.
pub fn record_sizing(batch_size: usize, concurrency: usize) {
    metrics::gauge!("analysis_batch_size_target").set(batch_size as f64);
    metrics::gauge!("analysis_concurrency_limit").set(concurrency as f64);
}

/// Count a submission rejected before it reached the queue.
pub fn record_rejection(reason: &'static str) {
    metrics::counter!("analysis_rejections_total", "reason" => reason).increment(1);
}

pub(crate) fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
