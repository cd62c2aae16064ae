//! Engine configuration.
//!
//! Aggregates the per-component configs. All fields have safe defaults;
//! `validate` runs at engine construction and misuse is fatal.

use std::time::Duration;

use serde::Serialize;

use super::error::ConfigError;
use super::input::InputLimits;
use crate::memory::CacheConfig;
use crate::scheduler::{AdaptiveConfig, LoadAdjusterConfig, QueueConfig, SizingConfig};

/// Full engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub queue: QueueConfig,
    pub sizing: SizingConfig,
    pub adaptive: AdaptiveConfig,
    pub load: LoadAdjusterConfig,
    pub input: InputLimits,
    /// Longest a partial batch waits before it is run anyway.
    pub batch_formation_timeout: Duration,
    /// Per-call analyzer timeout. `None` waits indefinitely.
    pub analyzer_timeout: Option<Duration>,
    pub shutdown_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            queue: QueueConfig::default(),
            sizing: SizingConfig::default(),
            adaptive: AdaptiveConfig::default(),
            load: LoadAdjusterConfig::default(),
            input: InputLimits::default(),
            batch_formation_timeout: Duration::from_millis(100),
            analyzer_timeout: Some(Duration::from_secs(30)),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid("cache capacity must be at least 1".into()));
        }
        if self.cache.ttl.is_zero() {
            return Err(ConfigError::Invalid("cache TTL must be non-zero".into()));
        }
        if self.queue.max_depth == 0 {
            return Err(ConfigError::Invalid("queue depth ceiling must be at least 1".into()));
        }
        self.sizing.validate()?;
        self.adaptive.validate()?;
        self.load.validate()?;
        if self.input.max_payload_bytes == 0 {
            return Err(ConfigError::Invalid("max payload size must be at least 1 byte".into()));
        }
        if !(1..=100).contains(&self.input.block_threshold) {
            return Err(ConfigError::Invalid(format!(
                "block threshold ({}) must lie in [1, 100]",
                self.input.block_threshold
            )));
        }
        if self.batch_formation_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "batch formation timeout must be non-zero".into(),
            ));
        }
        if self.analyzer_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::Invalid("analyzer timeout must be non-zero".into()));
        }
        Ok(())
    }

    /// Flat, serializable summary of all effective values.
    pub fn effective(&self) -> EffectiveConfig {
        EffectiveConfig {
            cache_max_entries: self.cache.max_entries,
            cache_ttl_secs: self.cache.ttl.as_secs(),
            cache_include_context: self.cache.include_context,
            queue_max_depth: self.queue.max_depth,
            initial_batch_size: self.sizing.initial_batch_size,
            min_batch_size: self.sizing.min_batch_size,
            max_batch_size: self.sizing.max_batch_size,
            initial_concurrency: self.sizing.initial_concurrency,
            min_concurrency: self.sizing.min_concurrency,
            max_concurrency: self.sizing.max_concurrency,
            target_latency_ms: self.adaptive.target_latency.as_millis() as u64,
            latency_window: self.adaptive.window,
            adaptation_interval_ms: self.adaptive.interval.as_millis() as u64,
            load_adjust_enabled: self.load.enabled,
            load_adjust_interval_ms: self.load.interval.as_millis() as u64,
            grow_load_ceiling: self.load.grow_load_ceiling,
            shrink_load_floor: self.load.shrink_load_floor,
            max_payload_bytes: self.input.max_payload_bytes,
            screen_adversarial: self.input.screen_adversarial,
            block_threshold: self.input.block_threshold,
            batch_formation_timeout_ms: self.batch_formation_timeout.as_millis() as u64,
            analyzer_timeout_ms: self.analyzer_timeout.map(|t| t.as_millis() as u64),
            shutdown_timeout_secs: self.shutdown_timeout.as_secs(),
        }
    }
}

/// Effective configuration summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveConfig {
    pub cache_max_entries: usize,
    pub cache_ttl_secs: u64,
    pub cache_include_context: bool,
    pub queue_max_depth: usize,
    pub initial_batch_size: usize,
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    pub initial_concurrency: usize,
    pub min_concurrency: usize,
    pub max_concurrency: usize,
    pub target_latency_ms: u64,
    pub latency_window: usize,
    pub adaptation_interval_ms: u64,
    pub load_adjust_enabled: bool,
    pub load_adjust_interval_ms: u64,
    pub grow_load_ceiling: f64,
    pub shrink_load_floor: f64,
    pub max_payload_bytes: usize,
    pub screen_adversarial: bool,
    pub block_threshold: u8,
    pub batch_formation_timeout_ms: u64,
    pub analyzer_timeout_ms: Option<u64>,
    pub shutdown_timeout_secs: u64,
}
