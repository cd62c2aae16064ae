//! Configuration loading from environment variables and TOML files.
//!
//! Values come from `ANALYSIS_CORE_*` environment variables layered over
//! defaults, optionally with a TOML file in between. Missing or unparsable
//! environment values fall back without crashing; the result is validated
//! when the engine is constructed.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `ANALYSIS_CORE_CACHE_MAX_ENTRIES` | 1000 | Cache capacity |
//! | `ANALYSIS_CORE_CACHE_TTL_SECS` | 1800 | Cache entry lifetime |
//! | `ANALYSIS_CORE_CACHE_INCLUDE_CONTEXT` | true | Context participates in cache keys |
//! | `ANALYSIS_CORE_QUEUE_MAX_DEPTH` | 1024 | Pending request ceiling |
//! | `ANALYSIS_CORE_BATCH_SIZE` | 5 | Initial batch size |
//! | `ANALYSIS_CORE_MIN_BATCH_SIZE` | 1 | Batch size floor |
//! | `ANALYSIS_CORE_MAX_BATCH_SIZE` | 20 | Batch size ceiling |
//! | `ANALYSIS_CORE_CONCURRENCY` | 3 | Initial concurrency limit |
//! | `ANALYSIS_CORE_MIN_CONCURRENCY` | 1 | Concurrency floor |
//! | `ANALYSIS_CORE_MAX_CONCURRENCY` | 10 | Concurrency ceiling |
//! | `ANALYSIS_CORE_TARGET_LATENCY_MS` | 1000 | Batch latency target |
//! | `ANALYSIS_CORE_LATENCY_WINDOW` | 10 | Latency samples kept |
//! | `ANALYSIS_CORE_ADAPTATION_INTERVAL_SECS` | 30 | Minimum time between adaptations |
//! | `ANALYSIS_CORE_LOAD_ADJUST_ENABLED` | true | Periodic load adjustment |
//! | `ANALYSIS_CORE_LOAD_ADJUST_INTERVAL_SECS` | 15 | Load adjustment period |
//! | `ANALYSIS_CORE_GROW_LOAD_CEILING` | 0.6 | Grow only below this load |
//! | `ANALYSIS_CORE_SHRINK_LOAD_FLOOR` | 0.8 | Shrink above this load |
//! | `ANALYSIS_CORE_MAX_PAYLOAD_BYTES` | 65536 | Maximum payload size |
//! | `ANALYSIS_CORE_SCREEN_ADVERSARIAL` | true | Screen text payloads |
//! | `ANALYSIS_CORE_BLOCK_THRESHOLD` | 50 | Screen risk score that blocks |
//! | `ANALYSIS_CORE_BATCH_FORMATION_TIMEOUT_MS` | 100 | Partial batch wait |
//! | `ANALYSIS_CORE_ANALYZER_TIMEOUT_MS` | 30000 | Per-call timeout (0 = none) |
//! | `ANALYSIS_CORE_SHUTDOWN_TIMEOUT_SECS` | 30 | Graceful shutdown timeout |
//!
//! A TOML file uses the same names, lowercased and without the prefix.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::{ConfigError, EngineConfig};

const ENV_PREFIX: &str = "ANALYSIS_CORE_";

/// Partial configuration. Every field left `None` keeps the value beneath it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverrides {
    pub cache_max_entries: Option<usize>,
    pub cache_ttl_secs: Option<u64>,
    pub cache_include_context: Option<bool>,
    pub queue_max_depth: Option<usize>,
    pub batch_size: Option<usize>,
    pub min_batch_size: Option<usize>,
    pub max_batch_size: Option<usize>,
    pub concurrency: Option<usize>,
    pub min_concurrency: Option<usize>,
    pub max_concurrency: Option<usize>,
    pub target_latency_ms: Option<u64>,
    pub latency_window: Option<usize>,
    pub adaptation_interval_secs: Option<u64>,
    pub load_adjust_enabled: Option<bool>,
    pub load_adjust_interval_secs: Option<u64>,
    pub grow_load_ceiling: Option<f64>,
    pub shrink_load_floor: Option<f64>,
    pub max_payload_bytes: Option<usize>,
    pub screen_adversarial: Option<bool>,
    pub block_threshold: Option<u8>,
    pub batch_formation_timeout_ms: Option<u64>,
    pub analyzer_timeout_ms: Option<u64>,
    pub shutdown_timeout_secs: Option<u64>,
}

/// Parse an env var, returning `None` on missing or invalid.
fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    let value = std::env::var(format!("{ENV_PREFIX}{name}")).ok()?;
    match value.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(variable = %format!("{ENV_PREFIX}{name}"), value = %value, "Ignoring unparsable value");
            None
        }
    }
}

/// Boolean env var accepting `true/false`, `1/0`, `yes/no`, `on/off`.
fn parse_env_bool(name: &str) -> Option<bool> {
    let value = std::env::var(format!("{ENV_PREFIX}{name}")).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(variable = %format!("{ENV_PREFIX}{name}"), value = %value, "Ignoring unparsable value");
            None
        }
    }
}

impl ConfigOverrides {
    pub fn from_env() -> Self {
        Self {
            cache_max_entries: parse_env("CACHE_MAX_ENTRIES"),
            cache_ttl_secs: parse_env("CACHE_TTL_SECS"),
            cache_include_context: parse_env_bool("CACHE_INCLUDE_CONTEXT"),
            queue_max_depth: parse_env("QUEUE_MAX_DEPTH"),
            batch_size: parse_env("BATCH_SIZE"),
            min_batch_size: parse_env("MIN_BATCH_SIZE"),
            max_batch_size: parse_env("MAX_BATCH_SIZE"),
            concurrency: parse_env("CONCURRENCY"),
            min_concurrency: parse_env("MIN_CONCURRENCY"),
            max_concurrency: parse_env("MAX_CONCURRENCY"),
            target_latency_ms: parse_env("TARGET_LATENCY_MS"),
            latency_window: parse_env("LATENCY_WINDOW"),
            adaptation_interval_secs: parse_env("ADAPTATION_INTERVAL_SECS"),
            load_adjust_enabled: parse_env_bool("LOAD_ADJUST_ENABLED"),
            load_adjust_interval_secs: parse_env("LOAD_ADJUST_INTERVAL_SECS"),
            grow_load_ceiling: parse_env("GROW_LOAD_CEILING"),
            shrink_load_floor: parse_env("SHRINK_LOAD_FLOOR"),
            max_payload_bytes: parse_env("MAX_PAYLOAD_BYTES"),
            screen_adversarial: parse_env_bool("SCREEN_ADVERSARIAL"),
            block_threshold: parse_env("BLOCK_THRESHOLD"),
            batch_formation_timeout_ms: parse_env("BATCH_FORMATION_TIMEOUT_MS"),
            analyzer_timeout_ms: parse_env("ANALYZER_TIMEOUT_MS"),
            shutdown_timeout_secs: parse_env("SHUTDOWN_TIMEOUT_SECS"),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Write every set field into `config`.
    pub fn apply(&self, config: &mut EngineConfig) {
        fn set<T: Copy>(target: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *target = value;
            }
        }
        let secs = |v: Option<u64>| v.map(Duration::from_secs);
        let millis = |v: Option<u64>| v.map(Duration::from_millis);

        set(&mut config.cache.max_entries, self.cache_max_entries);
        set(&mut config.cache.ttl, secs(self.cache_ttl_secs));
        set(&mut config.cache.include_context, self.cache_include_context);
        set(&mut config.queue.max_depth, self.queue_max_depth);
        set(&mut config.sizing.initial_batch_size, self.batch_size);
        set(&mut config.sizing.min_batch_size, self.min_batch_size);
        set(&mut config.sizing.max_batch_size, self.max_batch_size);
        set(&mut config.sizing.initial_concurrency, self.concurrency);
        set(&mut config.sizing.min_concurrency, self.min_concurrency);
        set(&mut config.sizing.max_concurrency, self.max_concurrency);
        set(&mut config.adaptive.target_latency, millis(self.target_latency_ms));
        set(&mut config.adaptive.window, self.latency_window);
        set(&mut config.adaptive.interval, secs(self.adaptation_interval_secs));
        set(&mut config.load.enabled, self.load_adjust_enabled);
        set(&mut config.load.interval, secs(self.load_adjust_interval_secs));
        set(&mut config.load.grow_load_ceiling, self.grow_load_ceiling);
        set(&mut config.load.shrink_load_floor, self.shrink_load_floor);
        set(&mut config.input.max_payload_bytes, self.max_payload_bytes);
        set(&mut config.input.screen_adversarial, self.screen_adversarial);
        set(&mut config.input.block_threshold, self.block_threshold);
        set(
            &mut config.batch_formation_timeout,
            millis(self.batch_formation_timeout_ms),
        );
        set(&mut config.shutdown_timeout, secs(self.shutdown_timeout_secs));
        if let Some(ms) = self.analyzer_timeout_ms {
            config.analyzer_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
    }
}

/// Load configuration from defaults and environment variables.
///
/// Missing or invalid values fall back to defaults without panicking.
pub fn load() -> EngineConfig {
    let mut config = EngineConfig::default();
    ConfigOverrides::from_env().apply(&mut config);
    config
}

/// Load configuration from a TOML file, then apply environment overrides.
pub fn load_file(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let file = ConfigOverrides::from_toml(&text).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut config = EngineConfig::default();
    file.apply(&mut config);
    ConfigOverrides::from_env().apply(&mut config);
    Ok(config)
}
