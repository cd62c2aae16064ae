//! Analyzer dispatch: the per-item batch path and the real-time fast path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::Instrument;

use super::analyzer::{AnalysisContext, AnalysisResult, Analyzer, AnalyzerError, Payload};
use super::error::EngineError;
use crate::memory::{CacheKey, ResultCache};
use crate::scheduler::{ItemExecutor, Priority, WorkItem};
use crate::telemetry::{BatchSpan, MetricsSink, RequestOutcome, RequestPath, SpanExt};

/// Calls the analyzer, fills the cache and reports request outcomes.
pub struct Dispatcher {
    analyzer: Arc<dyn Analyzer>,
    cache: Arc<ResultCache>,
    sink: Arc<dyn MetricsSink>,
    call_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(
        analyzer: Arc<dyn Analyzer>,
        cache: Arc<ResultCache>,
        sink: Arc<dyn MetricsSink>,
        call_timeout: Option<Duration>,
    ) -> Self {
        Self {
            analyzer,
            cache,
            sink,
            call_timeout,
        }
    }

    /// Standard analyzer call, bounded by the configured timeout.
    pub async fn analyze(
        &self,
        payload: &Payload,
        context: &AnalysisContext,
    ) -> Result<AnalysisResult, AnalyzerError> {
        self.bounded(self.analyzer.analyze(payload, context)).await
    }

    async fn analyze_real_time(
        &self,
        payload: &Payload,
        context: &AnalysisContext,
    ) -> Result<AnalysisResult, AnalyzerError> {
        self.bounded(self.analyzer.analyze_real_time(payload, context)).await
    }

    async fn bounded<F>(&self, call: F) -> Result<AnalysisResult, AnalyzerError>
    where
        F: std::future::Future<Output = Result<AnalysisResult, AnalyzerError>>,
    {
        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or(Err(AnalyzerError::Timeout(limit))),
            None => call.await,
        }
    }

    /// Dedicated call first, standard call on failure. The path names the
    /// call that produced the result.
    async fn real_time_call(
        &self,
        payload: &Payload,
        context: &AnalysisContext,
    ) -> (Result<AnalysisResult, AnalyzerError>, RequestPath) {
        match self.analyze_real_time(payload, context).await {
            Ok(result) => (Ok(result), RequestPath::RealTime),
            Err(AnalyzerError::Unsupported) => {
                (self.analyze(payload, context).await, RequestPath::RealTime)
            }
            Err(e) => {
                tracing::debug!(error = %e, "Real-time call failed, falling back");
                (
                    self.analyze(payload, context).await,
                    RequestPath::RealTimeFallback,
                )
            }
        }
    }

    /// Serve a real-time request outside the queue. The outcome is recorded
    /// once, tagged with the path that produced it.
    pub async fn real_time(
        &self,
        request_id: u64,
        payload: &Payload,
        context: &AnalysisContext,
        key: CacheKey,
        submitted_at: Instant,
    ) -> Result<AnalysisResult, EngineError> {
        let span = BatchSpan::real_time(request_id);
        let (result, path) = self
            .real_time_call(payload, context)
            .instrument(span.clone())
            .await;

        span.record("path", path.as_str());
        span.record_result(&result);

        match &result {
            Ok(value) => self.cache.store_key(key, value.clone()),
            Err(e) => span.in_scope(|| {
                tracing::warn!(error = %e, path = path.as_str(), "Real-time analysis failed")
            }),
        }
        self.sink.record_request(&RequestOutcome {
            priority: Priority::RealTime,
            path,
            latency: submitted_at.elapsed(),
            success: result.is_ok(),
        });
        result.map_err(EngineError::from)
    }

    /// Report a request answered straight from the cache.
    pub fn record_cache_hit(&self, priority: Priority, submitted_at: Instant) {
        self.sink.record_request(&RequestOutcome {
            priority,
            path: RequestPath::Cache,
            latency: submitted_at.elapsed(),
            success: true,
        });
    }
}

#[async_trait]
impl ItemExecutor for Dispatcher {
    async fn execute(&self, item: WorkItem) -> bool {
        // Another submission may have filled the cache since this item was
        // enqueued.
        if let Some(value) = self.cache.recheck_key(&item.cache_key) {
            self.record_cache_hit(item.priority, item.enqueued_at);
            item.settle(Ok(value));
            return true;
        }

        let (result, path) = if item.is_real_time() {
            self.real_time_call(&item.payload, &item.context).await
        } else {
            (
                self.analyze(&item.payload, &item.context).await,
                RequestPath::Batched,
            )
        };
        let success = result.is_ok();
        match &result {
            Ok(value) => self.cache.store_key(item.cache_key, value.clone()),
            Err(e) => tracing::warn!(
                request_id = item.id,
                priority = %item.priority,
                key = %item.cache_key.short(),
                path = path.as_str(),
                error = %e,
                "Analysis failed"
            ),
        }

        self.sink.record_request(&RequestOutcome {
            priority: item.priority,
            path,
            latency: item.enqueued_at.elapsed(),
            success,
        });
        if !item.settle(result.map_err(EngineError::from)) {
            tracing::trace!("Submitter stopped waiting; result discarded");
        }
        success
    }
}
