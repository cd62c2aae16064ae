//! Latency-feedback control of the batch size.
//!
//! Batch latencies accumulate in a bounded window. At most once per
//! adaptation interval, and only with at least three samples, the controller
//! compares the window's mean against the target latency:
//!
//! - mean above 120% of target: shrink by 2 when stable, by 1 otherwise
//! - mean below 80% of target: grow by 1 when stable; when unstable grow
//!   only while the batch size is below 5
//!
//! A window is stable when its standard deviation is under 20% of its mean.
//! The window is cleared after every decision, applied or not.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::sizing::SizingState;
use crate::engine::ConfigError;

const MIN_SAMPLES: usize = 3;
const SHRINK_RATIO: f64 = 1.2;
const GROW_RATIO: f64 = 0.8;
const STABILITY_RATIO: f64 = 0.2;
const UNSTABLE_GROWTH_CEILING: usize = 5;

/// Configuration for the adaptive sizing controller.
#[derive(Debug, Clone)]
pub struct AdaptiveConfig {
    pub target_latency: Duration,
    /// Capacity of the latency window.
    pub window: usize,
    /// Minimum time between two decisions.
    pub interval: Duration,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            target_latency: Duration::from_millis(1000),
            window: 10,
            interval: Duration::from_secs(30),
        }
    }
}

impl AdaptiveConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_latency.is_zero() {
            return Err(ConfigError::Invalid("target latency must be non-zero".into()));
        }
        if self.window < MIN_SAMPLES {
            return Err(ConfigError::Invalid(format!(
                "latency window must hold at least {MIN_SAMPLES} samples"
            )));
        }
        Ok(())
    }
}

/// Summary statistics of a latency window, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyStats {
    pub mean_ms: f64,
    pub std_dev_ms: f64,
    pub samples: usize,
}

impl LatencyStats {
    pub fn is_stable(&self) -> bool {
        self.std_dev_ms < self.mean_ms * STABILITY_RATIO
    }
}

/// Bounded ring buffer of recent batch latencies.
#[derive(Debug)]
pub struct LatencyWindow {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl LatencyWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, latency: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(latency);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Population mean and standard deviation; `None` when empty.
    pub fn stats(&self) -> Option<LatencyStats> {
        if self.samples.is_empty() {
            return None;
        }
        let n = self.samples.len() as f64;
        let values = self.samples.iter().map(|d| d.as_secs_f64() * 1000.0);
        let mean = values.clone().sum::<f64>() / n;
        let variance = values.map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(LatencyStats {
            mean_ms: mean,
            std_dev_ms: variance.sqrt(),
            samples: self.samples.len(),
        })
    }
}

/// Outcome of one adaptation decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingDecision {
    Shrink(usize),
    Grow(usize),
    Hold,
}

impl SizingDecision {
    fn delta(self) -> isize {
        match self {
            Self::Shrink(n) => -(n as isize),
            Self::Grow(n) => n as isize,
            Self::Hold => 0,
        }
    }
}

/// Pure decision rule. `current` and `max_batch_size` gate growth only;
/// the caller clamps the result.
pub fn decide(
    stats: &LatencyStats,
    target: Duration,
    current: usize,
    max_batch_size: usize,
) -> SizingDecision {
    let target_ms = target.as_secs_f64() * 1000.0;
    let stable = stats.is_stable();

    if stats.mean_ms > target_ms * SHRINK_RATIO {
        return SizingDecision::Shrink(if stable { 2 } else { 1 });
    }
    if stats.mean_ms < target_ms * GROW_RATIO && current < max_batch_size {
        if stable || current < UNSTABLE_GROWTH_CEILING {
            return SizingDecision::Grow(1);
        }
    }
    SizingDecision::Hold
}

/// Record of an applied decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adaptation {
    pub decision: SizingDecision,
    pub stats: LatencyStats,
    pub previous_batch_size: usize,
    pub batch_size: usize,
}

/// Feeds batch latencies into sizing decisions.
#[derive(Debug)]
pub struct AdaptiveController {
    config: AdaptiveConfig,
    window: LatencyWindow,
    last_decision: Option<Instant>,
}

impl AdaptiveController {
    pub fn new(config: AdaptiveConfig) -> Self {
        let window = LatencyWindow::new(config.window);
        Self {
            config,
            window,
            last_decision: None,
        }
    }

    pub fn record(&mut self, latency: Duration) {
        self.window.push(latency);
    }

    pub fn samples(&self) -> usize {
        self.window.len()
    }

    /// Decide and apply if the interval has elapsed and enough samples exist.
    ///
    /// Returns `None` when no decision was taken.
    pub fn maybe_adapt(&mut self, sizing: &SizingState, now: Instant) -> Option<Adaptation> {
        if let Some(last) = self.last_decision {
            if now.saturating_duration_since(last) < self.config.interval {
                return None;
            }
        }
        if self.window.len() < MIN_SAMPLES {
            return None;
        }
        let stats = self.window.stats()?;

        let previous = sizing.batch_size();
        let decision = decide(
            &stats,
            self.config.target_latency,
            previous,
            sizing.config().max_batch_size,
        );
        let batch_size = match decision {
            SizingDecision::Hold => previous,
            other => sizing.adjust_batch_size(other.delta()),
        };

        self.window.clear();
        self.last_decision = Some(now);

        Some(Adaptation {
            decision,
            stats,
            previous_batch_size: previous,
            batch_size,
        })
    }
}
