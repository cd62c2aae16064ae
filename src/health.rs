//! Health checks.
//!
//! Liveness, readiness and a full report derived from an engine status
//! snapshot.

use std::time::Instant;

use serde::Serialize;

use crate::engine::EngineStatus;
use crate::shutdown::ShutdownState;

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Detailed health report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub state: HealthState,
    pub ready: bool,
    pub accepting_requests: bool,
    pub queue_depth: usize,
    pub in_flight: u32,
    pub cache_size: usize,
    pub cache_hit_rate: f64,
    pub uptime_secs: u64,
}

/// Health check configuration.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Queue depth at which the engine reports degraded and not ready.
    pub max_queue_depth: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_queue_depth: 1000,
        }
    }
}

pub struct HealthChecker {
    config: HealthConfig,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
        }
    }

    pub fn is_alive(&self) -> bool {
        true
    }

    /// Accepting traffic and not backed up.
    pub fn is_ready(&self, shutdown_state: ShutdownState, queue_depth: usize) -> bool {
        shutdown_state == ShutdownState::Running && queue_depth < self.config.max_queue_depth
    }

    pub fn report(&self, status: &EngineStatus, shutdown_state: ShutdownState) -> HealthReport {
        HealthReport {
            state: self.compute_state(shutdown_state, status.queue_depth),
            ready: self.is_ready(shutdown_state, status.queue_depth),
            accepting_requests: shutdown_state == ShutdownState::Running,
            queue_depth: status.queue_depth,
            in_flight: status.in_flight,
            cache_size: status.cache_size,
            cache_hit_rate: status.cache_hit_rate,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    fn compute_state(&self, shutdown_state: ShutdownState, queue_depth: usize) -> HealthState {
        if shutdown_state != ShutdownState::Running {
            return HealthState::Unhealthy;
        }
        if queue_depth >= self.config.max_queue_depth {
            return HealthState::Degraded;
        }
        HealthState::Healthy
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}
