//! In-memory metrics store.
//!
//! Complements the `metrics` facade with values that can be read back in
//! process: tests assert on them and the CLI prints a snapshot. Also usable
//! directly as the engine's `MetricsSink`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::metrics::{duration_ms, BatchOutcome, MetricsSink, RequestOutcome};

/// Snapshot of all metrics at a point in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub counters: HashMap<String, u64>,
    pub gauges: HashMap<String, f64>,
    pub histograms: HashMap<String, HistogramSummary>,
}

impl MetricsSnapshot {
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.gauges.get(name).copied()
    }

    pub fn histogram(&self, name: &str) -> Option<&HistogramSummary> {
        self.histograms.get(name)
    }
}

/// Summary statistics for a histogram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramSummary {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

impl HistogramSummary {
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Histogram cell with f64 values stored as bit patterns.
struct HistogramData {
    count: AtomicU64,
    sum: AtomicU64,
    min: AtomicU64,
    max: AtomicU64,
}

impl HistogramData {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum: AtomicU64::new(f64::to_bits(0.0)),
            min: AtomicU64::new(f64::to_bits(f64::MAX)),
            max: AtomicU64::new(f64::to_bits(f64::MIN)),
        }
    }

    fn record(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        update_f64(&self.sum, |current| Some(current + value));
        update_f64(&self.min, |current| (value < current).then_some(value));
        update_f64(&self.max, |current| (value > current).then_some(value));
    }

    fn to_summary(&self) -> HistogramSummary {
        let count = self.count.load(Ordering::Relaxed);
        let load = |a: &AtomicU64| f64::from_bits(a.load(Ordering::Relaxed));
        HistogramSummary {
            count,
            sum: load(&self.sum),
            min: if count == 0 { 0.0 } else { load(&self.min) },
            max: if count == 0 { 0.0 } else { load(&self.max) },
        }
    }
}

/// CAS loop over an f64 stored in an `AtomicU64`. `f` returns `None` to leave
/// the value unchanged.
fn update_f64(atomic: &AtomicU64, f: impl Fn(f64) -> Option<f64>) {
    let _ = atomic.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
        f(f64::from_bits(bits)).map(f64::to_bits)
    });
}

/// Thread-safe metrics store.
pub struct MetricsStore {
    counters: RwLock<HashMap<String, AtomicU64>>,
    gauges: RwLock<HashMap<String, AtomicU64>>,
    histograms: RwLock<HashMap<String, HistogramData>>,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
            gauges: RwLock::new(HashMap::new()),
            histograms: RwLock::new(HashMap::new()),
        }
    }

    pub fn increment_counter(&self, name: &str, value: u64) {
        with_cell(&self.counters, name, AtomicU64::default, |c| {
            c.fetch_add(value, Ordering::Relaxed);
        });
    }

    pub fn set_gauge(&self, name: &str, value: f64) {
        with_cell(&self.gauges, name, AtomicU64::default, |g| {
            g.store(value.to_bits(), Ordering::Relaxed);
        });
    }

    pub fn record_histogram(&self, name: &str, value: f64) {
        with_cell(&self.histograms, name, HistogramData::new, |h| h.record(value));
    }

    /// Take a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self
                .counters
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
                .collect(),
            gauges: self
                .gauges
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), f64::from_bits(v.load(Ordering::Relaxed))))
                .collect(),
            histograms: self
                .histograms
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), v.to_summary()))
                .collect(),
        }
    }
}

/// Apply `f` to the named cell, creating it on first use. The write lock is
/// only taken for names not seen before.
fn with_cell<V>(
    cells: &RwLock<HashMap<String, V>>,
    name: &str,
    init: impl FnOnce() -> V,
    f: impl FnOnce(&V),
) {
    if let Some(cell) = cells.read().get(name) {
        f(cell);
        return;
    }
    f(cells.write().entry(name.to_string()).or_insert_with(init));
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for MetricsStore {
    fn record_batch(&self, outcome: &BatchOutcome) {
        self.increment_counter("batches_total", 1);
        if !outcome.success {
            self.increment_counter("batches_with_failures_total", 1);
        }
        self.increment_counter("batch_items_total", outcome.batch_size as u64);
        self.increment_counter("batch_real_time_items_total", outcome.real_time_count as u64);
        self.increment_counter("batch_normal_items_total", outcome.normal_count as u64);
        self.increment_counter("batch_failed_items_total", outcome.failed_count as u64);
        self.record_histogram("batch_latency_ms", duration_ms(outcome.latency));
        self.set_gauge("last_batch_size", outcome.batch_size as f64);
    }

    fn record_request(&self, outcome: &RequestOutcome) {
        let status = if outcome.success { "ok" } else { "error" };
        self.increment_counter(&format!("requests_{}_{}", outcome.path.as_str(), status), 1);
        self.record_histogram(
            &format!("request_latency_ms_{}", outcome.path.as_str()),
            duration_ms(outcome.latency),
        );
    }
}
