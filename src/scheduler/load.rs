//! Host-load driven sizing adjustments.
//!
//! Runs on its own schedule, independent of batch completion. Grows batch
//! size and concurrency when work is piling up on an idle host, shrinks both
//! when the queue is shallow or the host is busy.

use std::sync::Arc;
use std::time::Duration;

use sysinfo::System;

use super::queue::WorkQueue;
use super::sizing::SizingState;
use crate::engine::ConfigError;
use crate::telemetry::record_sizing;

/// Source of a normalized host load figure in `[0, 1]`.
pub trait LoadProbe: Send + Sync + 'static {
    fn normalized_load(&self) -> f64;
}

/// One-minute load average divided by the logical core count.
#[derive(Debug, Clone)]
pub struct HostLoadProbe {
    cores: usize,
}

impl HostLoadProbe {
    pub fn new() -> Self {
        Self {
            cores: num_cpus::get().max(1),
        }
    }
}

impl Default for HostLoadProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadProbe for HostLoadProbe {
    fn normalized_load(&self) -> f64 {
        // Platforms without load averages report zeros.
        let one = System::load_average().one;
        normalize(one, self.cores)
    }
}

fn normalize(load_average: f64, cores: usize) -> f64 {
    if !load_average.is_finite() || load_average <= 0.0 {
        return 0.0;
    }
    (load_average / cores.max(1) as f64).clamp(0.0, 1.0)
}

/// Probe returning a fixed value.
#[derive(Debug, Clone, Copy)]
pub struct FixedLoadProbe(pub f64);

impl LoadProbe for FixedLoadProbe {
    fn normalized_load(&self) -> f64 {
        self.0.clamp(0.0, 1.0)
    }
}

/// Load adjuster configuration.
#[derive(Debug, Clone)]
pub struct LoadAdjusterConfig {
    /// Run the periodic adjustment at all.
    pub enabled: bool,
    pub interval: Duration,
    /// Growth requires load strictly below this.
    pub grow_load_ceiling: f64,
    /// Load strictly above this forces a shrink.
    pub shrink_load_floor: f64,
}

impl Default for LoadAdjusterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(15),
            grow_load_ceiling: 0.6,
            shrink_load_floor: 0.8,
        }
    }
}

impl LoadAdjusterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("grow load ceiling", self.grow_load_ceiling),
            ("shrink load floor", self.shrink_load_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} ({value}) must lie in [0, 1]"
                )));
            }
        }
        if self.grow_load_ceiling > self.shrink_load_floor {
            return Err(ConfigError::Invalid(format!(
                "grow load ceiling ({}) exceeds shrink load floor ({})",
                self.grow_load_ceiling, self.shrink_load_floor
            )));
        }
        if self.enabled && self.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "load adjustment interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// What one evaluation decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadAction {
    Grow,
    Shrink,
    Hold,
}

/// Pure decision rule.
pub fn evaluate(depth: usize, batch_size: usize, load: f64, config: &LoadAdjusterConfig) -> LoadAction {
    if depth > batch_size.saturating_mul(2) && load < config.grow_load_ceiling {
        LoadAction::Grow
    } else if depth < batch_size || load > config.shrink_load_floor {
        LoadAction::Shrink
    } else {
        LoadAction::Hold
    }
}

/// Applies `evaluate` to live engine state.
pub struct LoadAdjuster {
    probe: Arc<dyn LoadProbe>,
    sizing: Arc<SizingState>,
    queue: Arc<WorkQueue>,
    config: LoadAdjusterConfig,
}

impl LoadAdjuster {
    pub fn new(
        probe: Arc<dyn LoadProbe>,
        sizing: Arc<SizingState>,
        queue: Arc<WorkQueue>,
        config: LoadAdjusterConfig,
    ) -> Self {
        Self {
            probe,
            sizing,
            queue,
            config,
        }
    }

    /// Run one evaluation and apply it.
    pub fn tick(&self) -> LoadAction {
        let depth = self.queue.len();
        let load = self.probe.normalized_load();
        let previous_batch = self.sizing.batch_size();
        let previous_concurrency = self.sizing.concurrency();

        let action = evaluate(depth, previous_batch, load, &self.config);
        let delta = match action {
            LoadAction::Grow => 1,
            LoadAction::Shrink => -1,
            LoadAction::Hold => return action,
        };

        let batch_size = self.sizing.adjust_batch_size(delta);
        let concurrency = self.sizing.adjust_concurrency(delta);

        if batch_size != previous_batch || concurrency != previous_concurrency {
            tracing::info!(
                action = ?action,
                depth,
                load,
                batch_size,
                concurrency,
                previous_batch,
                previous_concurrency,
                "Load-driven sizing change"
            );
            record_sizing(batch_size, concurrency);
        }
        action
    }
}
