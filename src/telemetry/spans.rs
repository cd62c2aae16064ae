//! Span utilities for batch tracing.

use tracing::{info_span, Span};

/// Extension trait for recording outcomes into spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for batch spans.
pub struct BatchSpan;

impl BatchSpan {
    /// Span covering one batch run.
    ///
    /// `status`, `latency_ms` and `failed` are filled in on completion.
    pub fn new(batch_id: u64, batch_size: usize, real_time: usize, normal: usize) -> Span {
        info_span!(
            "analysis_batch",
            batch_id,
            batch_size,
            real_time,
            normal,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
            failed = tracing::field::Empty,
        )
    }

    /// Span covering one real-time request.
    pub fn real_time(request_id: u64) -> Span {
        info_span!(
            "analysis_real_time",
            request_id,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            path = tracing::field::Empty,
        )
    }
}
