//! Analyzer capability consumed by the engine.
//!
//! The engine never interprets analysis results. It only needs a way to turn
//! a payload plus side-data into a list of labelled scores, and a way to tell
//! whether that call failed.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque input to the Analyzer. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    /// Size of the payload in bytes.
    pub fn byte_len(&self) -> usize {
        match self {
            Self::Text(t) => t.len(),
            Self::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.byte_len() == 0
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Binary(_) => None,
        }
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(value)
    }
}

/// Key/value side-data passed through to the Analyzer untouched.
///
/// Backed by a `BTreeMap` so serialization is canonical (sorted keys).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisContext(BTreeMap<String, String>);

impl AnalysisContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Stable byte serialization used for cache keys.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        // A BTreeMap<String, String> cannot fail to serialize.
        serde_json::to_vec(&self.0).unwrap_or_default()
    }
}

/// One typed-confidence-intensity triple produced by the Analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisLabel {
    pub label: String,
    pub confidence: f32,
    pub intensity: f32,
}

impl AnalysisLabel {
    pub fn new(label: impl Into<String>, confidence: f32, intensity: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
            intensity,
        }
    }
}

/// Full result of one analysis call.
pub type AnalysisResult = Vec<AnalysisLabel>;

/// Failures an Analyzer may report for a single call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalyzerError {
    #[error("analyzer call timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("operation not supported by this analyzer")]
    Unsupported,
}

/// External inference backend.
///
/// `analyze_real_time` is optional; the default reports `Unsupported`, which
/// the engine treats as "no dedicated low-latency path" rather than a failure.
#[async_trait]
pub trait Analyzer: Send + Sync + 'static {
    async fn analyze(
        &self,
        payload: &Payload,
        context: &AnalysisContext,
    ) -> Result<AnalysisResult, AnalyzerError>;

    async fn analyze_real_time(
        &self,
        _payload: &Payload,
        _context: &AnalysisContext,
    ) -> Result<AnalysisResult, AnalyzerError> {
        Err(AnalyzerError::Unsupported)
    }
}
