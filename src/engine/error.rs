//! Error types for the analysis engine.
//!
//! All errors are fail-closed: invalid inputs are rejected, not truncated.

use thiserror::Error;

use super::analyzer::AnalyzerError;

/// Errors a caller may observe when a submission settles.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("input rejected: {0}")]
    InputRejected(String),

    #[error("unsafe input blocked (risk score {risk_score})")]
    UnsafeInput { risk_score: u8, patterns: Vec<String> },

    #[error("queue full: {current}/{max} pending requests")]
    QueueFull { current: usize, max: usize },

    #[error("analysis failed: {0}")]
    Analyzer(#[from] AnalyzerError),

    #[error("engine is shutting down")]
    ShuttingDown,

    #[error("request dropped before completion")]
    Dropped,
}

impl EngineError {
    /// True when the caller caused the failure (bad input, backpressure).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InputRejected(_) | Self::UnsafeInput { .. } | Self::QueueFull { .. }
        )
    }

    /// True when the error came from the Analyzer backend.
    pub fn is_analyzer_failure(&self) -> bool {
        matches!(self, Self::Analyzer(_))
    }
}

/// Configuration errors. Fatal at engine construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config file {path}: {reason}")]
    Parse { path: String, reason: String },
}
