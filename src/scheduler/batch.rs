//! Batch scheduler.
//!
//! Drives the `Idle -> Scheduled -> Running -> Idle` cycle. A run is
//! scheduled immediately when a real-time item arrives or the queue reaches
//! the current batch size, otherwise by the batch-formation timer armed on
//! the first enqueue since the last drain. Only one batch runs at a time;
//! a trigger while running is a no-op and the finished run reschedules
//! itself if work remains.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::Instrument;

use super::adaptive::AdaptiveController;
use super::limiter::ConcurrencyLimiter;
use super::priority::Priority;
use super::queue::WorkQueue;
use super::sizing::SizingState;
use super::timer::BatchTimer;
use super::work_item::WorkItem;
use crate::telemetry::{record_queue_depth, record_sizing, BatchOutcome, BatchSpan, MetricsSink};

/// Executes one drained item and settles its result.
#[async_trait]
pub trait ItemExecutor: Send + Sync + 'static {
    /// Returns true when the item settled successfully.
    async fn execute(&self, item: WorkItem) -> bool;
}

/// Observable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPhase {
    Idle,
    Scheduled,
    Running,
}

/// Collaborators the scheduler drives.
pub struct SchedulerParts {
    pub queue: Arc<WorkQueue>,
    pub sizing: Arc<SizingState>,
    pub limiter: Arc<ConcurrencyLimiter>,
    pub controller: AdaptiveController,
    pub sink: Arc<dyn MetricsSink>,
    pub executor: Arc<dyn ItemExecutor>,
    pub formation_timeout: Duration,
}

struct Shared {
    queue: Arc<WorkQueue>,
    sizing: Arc<SizingState>,
    limiter: Arc<ConcurrencyLimiter>,
    controller: Mutex<AdaptiveController>,
    sink: Arc<dyn MetricsSink>,
    executor: Arc<dyn ItemExecutor>,
    formation_timeout: Duration,
    timer: BatchTimer,
    running: AtomicBool,
    pending: AtomicBool,
    batches_started: AtomicU64,
    batches_completed: AtomicU64,
}

/// Handle to the engine's single batch scheduler.
#[derive(Clone)]
pub struct BatchScheduler {
    shared: Arc<Shared>,
}

impl BatchScheduler {
    pub fn new(parts: SchedulerParts) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: parts.queue,
                sizing: parts.sizing,
                limiter: parts.limiter,
                controller: Mutex::new(parts.controller),
                sink: parts.sink,
                executor: parts.executor,
                formation_timeout: parts.formation_timeout,
                timer: BatchTimer::new(),
                running: AtomicBool::new(false),
                pending: AtomicBool::new(false),
                batches_started: AtomicU64::new(0),
                batches_completed: AtomicU64::new(0),
            }),
        }
    }

    /// React to an enqueue of `priority` that left the queue at `depth`.
    pub fn notify(&self, priority: Priority, depth: usize) {
        if priority.is_real_time() || depth >= self.shared.sizing.batch_size() {
            self.schedule_now();
        } else {
            let weak = Arc::downgrade(&self.shared);
            let armed = self
                .shared
                .timer
                .arm_if_idle(self.shared.formation_timeout, move || on_timer(weak));
            if armed {
                tracing::trace!(depth, "Batch formation timer armed");
            }
        }
    }

    /// Schedule a run now, superseding any pending formation timer.
    pub fn schedule_now(&self) {
        self.shared.timer.cancel();
        Shared::spawn_run(Arc::clone(&self.shared));
    }

    /// Run one batch on the calling task. Returns `None` when a batch is
    /// already running or the queue is empty.
    pub async fn run_now(&self) -> Option<BatchOutcome> {
        self.shared.run_exclusive().await
    }

    pub fn phase(&self) -> SchedulerPhase {
        let shared = &self.shared;
        if shared.running.load(Ordering::SeqCst) {
            SchedulerPhase::Running
        } else if shared.pending.load(Ordering::SeqCst) || shared.timer.is_armed() {
            SchedulerPhase::Scheduled
        } else {
            SchedulerPhase::Idle
        }
    }

    pub fn batches_completed(&self) -> u64 {
        self.shared.batches_completed.load(Ordering::Acquire)
    }

    /// Latency samples waiting for the next adaptation decision.
    pub fn pending_latency_samples(&self) -> usize {
        self.shared.controller.lock().samples()
    }

    /// Drop any pending formation timer.
    pub fn cancel_timer(&self) {
        self.shared.timer.cancel();
    }
}

fn on_timer(weak: Weak<Shared>) {
    if let Some(shared) = weak.upgrade() {
        Shared::spawn_run(shared);
    }
}

impl Shared {
    fn spawn_run(shared: Arc<Self>) {
        shared.pending.store(true, Ordering::SeqCst);
        tokio::spawn(async move {
            shared.pending.store(false, Ordering::SeqCst);
            shared.run_exclusive().await;
            if !shared.running.load(Ordering::SeqCst) && !shared.queue.is_empty() {
                Self::spawn_run(shared);
            }
        });
    }

    async fn run_exclusive(&self) -> Option<BatchOutcome> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        let _running = RunningGuard(&self.running);
        self.timer.cancel();
        self.run_batch().await
    }

    async fn run_batch(&self) -> Option<BatchOutcome> {
        let items = self.queue.drain(self.sizing.batch_size());
        if items.is_empty() {
            return None;
        }
        record_queue_depth(self.queue.len());

        let batch_size = items.len();
        let (real_time, normal): (Vec<WorkItem>, Vec<WorkItem>) =
            items.into_iter().partition(WorkItem::is_real_time);
        let real_time_count = real_time.len();
        let normal_count = normal.len();
        let concurrency = self.sizing.concurrency();

        let batch_id = self.batches_started.fetch_add(1, Ordering::Relaxed);
        let span = BatchSpan::new(batch_id, batch_size, real_time_count, normal_count);
        let started = Instant::now();

        let executor = &self.executor;
        let real_time_calls = real_time.into_iter().map(|item| executor.execute(item));
        let normal_calls = normal.into_iter().map(|item| executor.execute(item));

        let (real_time_results, normal_results) = async {
            tokio::join!(
                join_all(real_time_calls),
                self.limiter.run_all(normal_calls, concurrency)
            )
        }
        .instrument(span.clone())
        .await;

        let latency = started.elapsed();
        let failed_count = real_time_results
            .iter()
            .chain(normal_results.iter())
            .filter(|ok| !**ok)
            .count();

        let outcome = BatchOutcome {
            batch_size,
            real_time_count,
            normal_count,
            latency,
            success: failed_count == 0,
            failed_count,
        };

        span.record("status", if outcome.success { "ok" } else { "partial" });
        span.record("latency_ms", latency.as_millis() as u64);
        span.record("failed", failed_count);
        span.in_scope(|| {
            tracing::debug!(
                batch_size,
                real_time = real_time_count,
                normal = normal_count,
                failed = failed_count,
                concurrency,
                latency_ms = latency.as_millis() as u64,
                "Batch complete"
            )
        });

        self.sink.record_batch(&outcome);
        if normal_count > 0 {
            self.adapt(latency);
        }
        self.batches_completed.fetch_add(1, Ordering::AcqRel);
        Some(outcome)
    }

    fn adapt(&self, latency: Duration) {
        let mut controller = self.controller.lock();
        controller.record(latency);
        let Some(adaptation) = controller.maybe_adapt(&self.sizing, Instant::now()) else {
            return;
        };
        drop(controller);

        if adaptation.batch_size != adaptation.previous_batch_size {
            tracing::info!(
                decision = ?adaptation.decision,
                mean_ms = adaptation.stats.mean_ms,
                std_dev_ms = adaptation.stats.std_dev_ms,
                previous = adaptation.previous_batch_size,
                batch_size = adaptation.batch_size,
                "Adaptive batch size change"
            );
            record_sizing(adaptation.batch_size, self.sizing.concurrency());
        } else {
            tracing::debug!(
                decision = ?adaptation.decision,
                mean_ms = adaptation.stats.mean_ms,
                batch_size = adaptation.batch_size,
                "Adaptive sizing held"
            );
        }
    }
}

/// Clears the running flag even if the batch future panics.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
