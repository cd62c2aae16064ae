//! Shared batch-size and concurrency targets.
//!
//! Only the adaptive controller and the load adjuster write these values.
//! Every write is clamped to the configured bounds.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::engine::ConfigError;

/// Bounds and starting points for batch size and concurrency.
#[derive(Debug, Clone)]
pub struct SizingConfig {
    pub initial_batch_size: usize,
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    pub initial_concurrency: usize,
    pub min_concurrency: usize,
    pub max_concurrency: usize,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            initial_batch_size: 5,
            min_batch_size: 1,
            max_batch_size: 20,
            initial_concurrency: 3,
            min_concurrency: 1,
            max_concurrency: 10,
        }
    }
}

impl SizingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "batch size",
            self.min_batch_size,
            self.max_batch_size,
            self.initial_batch_size,
        )?;
        check_range(
            "concurrency",
            self.min_concurrency,
            self.max_concurrency,
            self.initial_concurrency,
        )
    }
}

fn check_range(name: &str, min: usize, max: usize, initial: usize) -> Result<(), ConfigError> {
    if min == 0 {
        return Err(ConfigError::Invalid(format!("minimum {name} must be at least 1")));
    }
    if min > max {
        return Err(ConfigError::Invalid(format!(
            "minimum {name} ({min}) exceeds maximum ({max})"
        )));
    }
    if !(min..=max).contains(&initial) {
        return Err(ConfigError::Invalid(format!(
            "initial {name} ({initial}) outside [{min}, {max}]"
        )));
    }
    Ok(())
}

/// Current batch-size and concurrency targets.
#[derive(Debug)]
pub struct SizingState {
    batch_size: AtomicUsize,
    concurrency: AtomicUsize,
    config: SizingConfig,
}

impl SizingState {
    /// Callers are expected to have validated `config`.
    pub fn new(config: SizingConfig) -> Self {
        Self {
            batch_size: AtomicUsize::new(config.initial_batch_size),
            concurrency: AtomicUsize::new(config.initial_concurrency),
            config,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.load(Ordering::Acquire)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &SizingConfig {
        &self.config
    }

    /// Shift batch size by `delta` within bounds. Returns the new value.
    pub fn adjust_batch_size(&self, delta: isize) -> usize {
        adjust(
            &self.batch_size,
            delta,
            self.config.min_batch_size,
            self.config.max_batch_size,
        )
    }

    /// Shift concurrency by `delta` within bounds. Returns the new value.
    pub fn adjust_concurrency(&self, delta: isize) -> usize {
        adjust(
            &self.concurrency,
            delta,
            self.config.min_concurrency,
            self.config.max_concurrency,
        )
    }

    pub fn set_batch_size(&self, value: usize) -> usize {
        let clamped = value.clamp(self.config.min_batch_size, self.config.max_batch_size);
        self.batch_size.store(clamped, Ordering::Release);
        clamped
    }
}

fn adjust(value: &AtomicUsize, delta: isize, min: usize, max: usize) -> usize {
    let apply = |current: usize| {
        let next = current.saturating_add_signed(delta).clamp(min, max);
        Some(next)
    };
    let previous = value
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, apply)
        .unwrap_or_else(|prev| prev);
    previous.saturating_add_signed(delta).clamp(min, max)
}
