//! Telemetry for the analysis engine.
//!
//! Provides structured logging, batch spans, outcome sinks and an in-memory
//! metrics store.

mod logging;
mod metrics;
mod spans;
mod store;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{
    record_queue_depth, record_rejection, record_sizing, BatchOutcome, MetricsFacadeSink,
    MetricsSink, RequestOutcome, RequestPath,
};
pub use spans::{BatchSpan, SpanExt};
pub use store::{HistogramSummary, MetricsSnapshot, MetricsStore};
