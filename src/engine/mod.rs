//! Analysis engine surface.
//!
//! The `Analyzer` seam, submission validation, dispatch to the analyzer and
//! the `AnalysisEngine` handle that ties the components together.

pub mod analyzer;
pub mod config;
mod core;
mod dispatch;
pub mod error;
pub mod input;

pub use analyzer::{
    AnalysisContext, AnalysisLabel, AnalysisResult, Analyzer, AnalyzerError, Payload,
};
pub use config::{EffectiveConfig, EngineConfig};
pub use self::core::{AnalysisEngine, Collaborators, EngineStatus, WarmupReport};
pub use dispatch::Dispatcher;
pub use error::{ConfigError, EngineError};
pub use input::{InputLimits, InputValidator, MAX_PAYLOAD_BYTES};
