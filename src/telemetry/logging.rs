//! Logging setup.
//!
//! One global `tracing` subscriber: an `EnvFilter` plus either a JSON or a
//! human-readable formatter, writing to stderr or an append-mode log file.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::fmt::{self, writer::BoxMakeWriter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const ENV_FILTER: &str = "ANALYSIS_CORE_LOG";
const ENV_FORMAT: &str = "ANALYSIS_CORE_LOG_FORMAT";
const ENV_FILE: &str = "ANALYSIS_CORE_LOG_FILE";

/// How log records are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per record.
    #[default]
    Json,
    /// Multi-line, human-oriented output.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("json") {
            Ok(Self::Json)
        } else if s.eq_ignore_ascii_case("pretty") {
            Ok(Self::Pretty)
        } else {
            Err(LogError::UnknownFormat(s.to_string()))
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive, e.g. `info` or `analysis_core::scheduler=trace`.
    pub level: String,
    /// Append to this file instead of stderr.
    pub output_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: "info".into(),
            output_path: None,
        }
    }
}

impl LogConfig {
    /// Defaults overlaid with `ANALYSIS_CORE_LOG`, `ANALYSIS_CORE_LOG_FORMAT`
    /// and `ANALYSIS_CORE_LOG_FILE`. An unknown format keeps the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(level) = std::env::var(ENV_FILTER) {
            config.level = level;
        }
        if let Some(format) = std::env::var(ENV_FORMAT).ok().and_then(|v| v.parse().ok()) {
            config.format = format;
        }
        config.output_path = std::env::var_os(ENV_FILE).map(PathBuf::from);
        config
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("invalid log filter directive: {0}")]
    InvalidFilter(String),
    #[error("unknown log format {0:?} (expected json or pretty)")]
    UnknownFormat(String),
    #[error("cannot open log file {path}: {reason}")]
    FileOpen { path: String, reason: String },
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Install the global subscriber described by `config`.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| LogError::InvalidFilter(e.to_string()))?;
    let to_file = config.output_path.is_some();
    let writer = make_writer(config.output_path.as_deref())?;

    let (json, pretty) = match config.format {
        LogFormat::Json => (Some(fmt::layer().json().with_writer(writer)), None),
        LogFormat::Pretty => (
            None,
            Some(fmt::layer().pretty().with_ansi(!to_file).with_writer(writer)),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .try_init()
        .map_err(|_| LogError::AlreadyInitialized)
}

fn make_writer(path: Option<&Path>) -> Result<BoxMakeWriter, LogError> {
    let Some(path) = path else {
        return Ok(BoxMakeWriter::new(std::io::stderr));
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| LogError::FileOpen {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    Ok(BoxMakeWriter::new(Mutex::new(file)))
}
