//! Adaptive request-scheduling and caching engine.
//!
//! Mediates between callers that need analysis results and a slow,
//! rate-limited analysis backend:
//!
//! - **Cache**: bounded LRU+TTL store keyed on normalized input
//! - **Queue**: four priority tiers, FIFO within a tier, optional ceiling
//! - **Scheduler**: batches drained on size, timeout or real-time arrival
//! - **Limiter**: semaphore-bounded fan-out to the analyzer
//! - **Sizing**: latency-feedback and host-load control of batch size and
//!   concurrency
//!
//! The analyzer, the metrics sink and the load probe are injected through
//! [`engine::Collaborators`].

pub mod config;
pub mod engine;
pub mod health;
pub mod memory;
pub mod scheduler;
pub mod security;
pub mod shutdown;
pub mod telemetry;

pub use engine::{
    AnalysisContext, AnalysisEngine, AnalysisLabel, AnalysisResult, Analyzer, AnalyzerError,
    Collaborators, ConfigError, EngineConfig, EngineError, EngineStatus, Payload, WarmupReport,
};
pub use scheduler::Priority;
