//! The analysis engine.
//!
//! Composes the cache, queue, batch scheduler, sizing controllers and
//! dispatcher behind a cloneable handle. Construct one per configuration at
//! the composition root and pass clones to callers.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::analyzer::{AnalysisContext, AnalysisResult, Analyzer, Payload};
use super::config::EngineConfig;
use super::dispatch::Dispatcher;
use super::error::{ConfigError, EngineError};
use super::input::InputValidator;
use crate::health::{HealthChecker, HealthConfig, HealthReport};
use crate::memory::{CacheKey, ResultCache};
use crate::scheduler::{
    AdaptiveController, BatchScheduler, ConcurrencyLimiter, HostLoadProbe, ItemExecutor,
    LoadAction, LoadAdjuster, LoadProbe, Priority, SchedulerParts, SchedulerPhase, SizingState,
    WorkItem, WorkQueue,
};
use crate::security::InputScreen;
use crate::shutdown::{ShutdownCoordinator, ShutdownGuard, ShutdownResult, ShutdownState};
use crate::telemetry::{
    record_queue_depth, record_rejection, record_sizing, MetricsFacadeSink, MetricsSink,
};

/// External capabilities injected at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub analyzer: Arc<dyn Analyzer>,
    pub metrics: Arc<dyn MetricsSink>,
    pub load_probe: Arc<dyn LoadProbe>,
}

impl Collaborators {
    /// Defaults: `metrics` facade sink and host load probe.
    pub fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        Self {
            analyzer,
            metrics: Arc::new(MetricsFacadeSink),
            load_probe: Arc::new(HostLoadProbe::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_load_probe(mut self, load_probe: Arc<dyn LoadProbe>) -> Self {
        self.load_probe = load_probe;
        self
    }
}

/// Read-only observability snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub queue_depth: usize,
    pub current_batch_size: usize,
    pub current_concurrency_limit: usize,
    pub cache_size: usize,
    pub cache_hit_rate: f64,
    /// Admitted requests not yet settled.
    pub in_flight: u32,
    pub scheduler_phase: SchedulerPhase,
    pub batches_completed: u64,
}

/// Outcome of a cache warm-up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmupReport {
    pub requested: usize,
    /// Present before warm-up, or duplicated within the request.
    pub already_cached: usize,
    pub warmed: usize,
    /// Rejected by input validation or failed in the analyzer.
    pub failed: usize,
}

struct EngineInner {
    config: EngineConfig,
    cache: Arc<ResultCache>,
    queue: Arc<WorkQueue>,
    sizing: Arc<SizingState>,
    limiter: Arc<ConcurrencyLimiter>,
    scheduler: BatchScheduler,
    dispatcher: Arc<Dispatcher>,
    load_adjuster: Arc<LoadAdjuster>,
    validator: InputValidator,
    shutdown: ShutdownCoordinator,
    health: HealthChecker,
    next_id: AtomicU64,
    maintenance: CancellationToken,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.maintenance.cancel();
        self.scheduler.cancel_timer();
    }
}

/// Adaptive request-scheduling and caching engine.
#[derive(Clone)]
pub struct AnalysisEngine {
    inner: Arc<EngineInner>,
}

impl AnalysisEngine {
    /// Engine with the default metrics sink and host load probe.
    pub fn new(config: EngineConfig, analyzer: Arc<dyn Analyzer>) -> Result<Self, ConfigError> {
        Self::with_collaborators(config, Collaborators::new(analyzer))
    }

    /// Validates `config` and wires the components together. When called
    /// inside a Tokio runtime, also starts the periodic maintenance task
    /// (load adjustment and cache purge).
    pub fn with_collaborators(
        config: EngineConfig,
        collaborators: Collaborators,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let screen = if config.input.screen_adversarial {
            let screen = InputScreen::with_threshold(config.input.block_threshold)
                .map_err(|e| ConfigError::Invalid(format!("input screen: {e}")))?;
            Some(screen)
        } else {
            None
        };

        let cache = Arc::new(ResultCache::new(config.cache.clone()));
        let queue = Arc::new(WorkQueue::new(config.queue.clone()));
        let sizing = Arc::new(SizingState::new(config.sizing.clone()));
        let limiter = Arc::new(ConcurrencyLimiter::new());
        let dispatcher = Arc::new(Dispatcher::new(
            collaborators.analyzer,
            Arc::clone(&cache),
            Arc::clone(&collaborators.metrics),
            config.analyzer_timeout,
        ));
        let scheduler = BatchScheduler::new(SchedulerParts {
            queue: Arc::clone(&queue),
            sizing: Arc::clone(&sizing),
            limiter: Arc::clone(&limiter),
            controller: AdaptiveController::new(config.adaptive.clone()),
            sink: collaborators.metrics,
            executor: Arc::clone(&dispatcher) as Arc<dyn ItemExecutor>,
            formation_timeout: config.batch_formation_timeout,
        });
        let load_adjuster = Arc::new(LoadAdjuster::new(
            collaborators.load_probe,
            Arc::clone(&sizing),
            Arc::clone(&queue),
            config.load.clone(),
        ));
        let health = HealthChecker::new(HealthConfig {
            max_queue_depth: config.queue.max_depth,
        });

        let maintenance = CancellationToken::new();
        spawn_maintenance(&config, &cache, &load_adjuster, maintenance.clone());
        record_sizing(sizing.batch_size(), sizing.concurrency());

        tracing::info!(
            batch_size = sizing.batch_size(),
            concurrency = sizing.concurrency(),
            cache_capacity = config.cache.max_entries,
            queue_ceiling = config.queue.max_depth,
            "Analysis engine started"
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                validator: InputValidator::new(config.input.clone(), screen),
                config,
                cache,
                queue,
                sizing,
                limiter,
                scheduler,
                dispatcher,
                load_adjuster,
                shutdown: ShutdownCoordinator::new(),
                health,
                next_id: AtomicU64::new(1),
                maintenance,
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Analyze `payload`, from the cache when possible, otherwise through
    /// the batch scheduler. Once queued, the request stays in flight until
    /// its item settles, whether or not this future is still polled.
    pub async fn submit(
        &self,
        payload: Payload,
        context: AnalysisContext,
        priority: Priority,
    ) -> Result<AnalysisResult, EngineError> {
        let submitted_at = Instant::now();
        let inner = &self.inner;
        let admitted = self.admit(&payload)?;

        let key = inner.cache.key_for(&payload, &context);
        if let Some(value) = inner.cache.lookup_key(&key) {
            inner.dispatcher.record_cache_hit(priority, submitted_at);
            return Ok(value);
        }

        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (item, rx) = WorkItem::new(id, payload, context, priority, key);
        let item = item.with_admission(admitted);
        let depth = match inner.queue.enqueue(item) {
            Ok(depth) => depth,
            Err(e) => {
                tracing::warn!(request_id = id, error = %e, "Submission refused");
                record_rejection("queue_full");
                return Err(e);
            }
        };
        record_queue_depth(depth);
        inner.scheduler.notify(priority, depth);

        rx.await.unwrap_or(Err(EngineError::Dropped))
    }

    /// Real-time submission. Bypasses the queue: cache first, then the
    /// analyzer's low-latency call, falling back to the standard call.
    pub async fn submit_real_time(
        &self,
        payload: Payload,
        context: AnalysisContext,
    ) -> Result<AnalysisResult, EngineError> {
        let submitted_at = Instant::now();
        let inner = &self.inner;
        let _admitted = self.admit(&payload)?;

        let key = inner.cache.key_for(&payload, &context);
        if let Some(value) = inner.cache.lookup_key(&key) {
            inner
                .dispatcher
                .record_cache_hit(Priority::RealTime, submitted_at);
            return Ok(value);
        }

        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        inner
            .dispatcher
            .real_time(id, &payload, &context, key, submitted_at)
            .await
    }

    /// Pre-populate the cache for entries not already present. Analyzer
    /// calls run under the current concurrency limit, outside the scheduler.
    pub async fn warm_cache(
        &self,
        entries: Vec<(Payload, AnalysisContext)>,
    ) -> Result<WarmupReport, EngineError> {
        let inner = &self.inner;
        let Some(_admitted) = inner.shutdown.track() else {
            return Err(EngineError::ShuttingDown);
        };

        let mut report = WarmupReport {
            requested: entries.len(),
            ..Default::default()
        };
        let mut seen: HashSet<CacheKey> = HashSet::new();
        let mut pending = Vec::new();
        for (payload, context) in entries {
            if let Err(e) = inner.validator.validate(&payload) {
                tracing::debug!(error = %e, "Warm-up entry rejected");
                report.failed += 1;
                continue;
            }
            let key = inner.cache.key_for(&payload, &context);
            if !seen.insert(key) || inner.cache.contains_key(&key) {
                report.already_cached += 1;
                continue;
            }
            pending.push((payload, context, key));
        }

        let dispatcher = &inner.dispatcher;
        let cache = &inner.cache;
        let calls = pending.into_iter().map(|(payload, context, key)| async move {
            match dispatcher.analyze(&payload, &context).await {
                Ok(value) => {
                    cache.store_key(key, value);
                    true
                }
                Err(e) => {
                    tracing::warn!(key = %key.short(), error = %e, "Warm-up analysis failed");
                    false
                }
            }
        });
        let outcomes = inner
            .limiter
            .run_all(calls, inner.sizing.concurrency())
            .await;

        report.warmed = outcomes.iter().filter(|ok| **ok).count();
        report.failed += outcomes.len() - report.warmed;

        tracing::info!(
            requested = report.requested,
            already_cached = report.already_cached,
            warmed = report.warmed,
            failed = report.failed,
            "Cache warm-up complete"
        );
        Ok(report)
    }

    pub fn status(&self) -> EngineStatus {
        let inner = &self.inner;
        EngineStatus {
            queue_depth: inner.queue.len(),
            current_batch_size: inner.sizing.batch_size(),
            current_concurrency_limit: inner.sizing.concurrency(),
            cache_size: inner.cache.len(),
            cache_hit_rate: inner.cache.hit_rate(),
            in_flight: inner.shutdown.in_flight_count(),
            scheduler_phase: inner.scheduler.phase(),
            batches_completed: inner.scheduler.batches_completed(),
        }
    }

    pub fn health(&self) -> HealthReport {
        self.inner
            .health
            .report(&self.status(), self.inner.shutdown.state())
    }

    pub fn shutdown_state(&self) -> ShutdownState {
        self.inner.shutdown.state()
    }

    /// Run one load adjustment now, outside the periodic schedule.
    pub fn adjust_for_load(&self) -> LoadAction {
        self.inner.load_adjuster.tick()
    }

    /// Drop every cached result.
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    /// Refuse new submissions, flush queued work and wait up to `timeout`
    /// for admitted requests to settle.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownResult {
        let inner = &self.inner;
        tracing::info!(
            queue_depth = inner.queue.len(),
            in_flight = inner.shutdown.in_flight_count(),
            "Shutdown requested"
        );
        inner.maintenance.cancel();
        if !inner.queue.is_empty() {
            inner.scheduler.schedule_now();
        }

        let result = inner.shutdown.initiate(timeout).await;
        match &result {
            ShutdownResult::Complete => tracing::info!("Shutdown complete"),
            ShutdownResult::Timeout { remaining } => {
                tracing::warn!(remaining, "Shutdown timed out with requests outstanding")
            }
        }
        result
    }

    fn admit(&self, payload: &Payload) -> Result<ShutdownGuard, EngineError> {
        let Some(guard) = self.inner.shutdown.track() else {
            record_rejection("shutting_down");
            return Err(EngineError::ShuttingDown);
        };
        if let Err(e) = self.inner.validator.validate(payload) {
            tracing::debug!(error = %e, bytes = payload.byte_len(), "Submission rejected");
            record_rejection(rejection_reason(&e));
            return Err(e);
        }
        Ok(guard)
    }
}

fn rejection_reason(error: &EngineError) -> &'static str {
    match error {
        EngineError::UnsafeInput { .. } => "unsafe_input",
        EngineError::QueueFull { .. } => "queue_full",
        EngineError::ShuttingDown => "shutting_down",
        _ => "invalid_input",
    }
}

fn spawn_maintenance(
    config: &EngineConfig,
    cache: &Arc<ResultCache>,
    load_adjuster: &Arc<LoadAdjuster>,
    token: CancellationToken,
) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        tracing::debug!("No Tokio runtime; periodic maintenance disabled");
        return;
    };
    let period = config.load.interval.max(Duration::from_millis(1));
    let adjust = config.load.enabled;
    let cache = Arc::clone(cache);
    let load_adjuster = Arc::clone(load_adjuster);

    handle.spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!("Maintenance task stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if adjust {
                        load_adjuster.tick();
                    }
                    let purged = cache.purge_expired();
                    if purged > 0 {
                        tracing::debug!(purged, "Expired cache entries purged");
                    }
                }
            }
        }
    });
}
