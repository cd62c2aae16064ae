//! Shared test doubles for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use analysis_core::engine::{
    AnalysisContext, AnalysisLabel, AnalysisResult, Analyzer, AnalyzerError, Payload,
};
use analysis_core::scheduler::FixedLoadProbe;
use analysis_core::telemetry::MetricsStore;
use analysis_core::{AnalysisEngine, Collaborators, EngineConfig};

/// How the stub answers `analyze_real_time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealTimeMode {
    Unsupported,
    Succeed,
    Fail,
}

/// Instrumented analyzer: counts calls, tracks peak concurrency and can be
/// told to fail for specific payloads.
pub struct StubAnalyzer {
    result: AnalysisResult,
    real_time_result: AnalysisResult,
    delay: Duration,
    fail_on: Vec<String>,
    real_time: RealTimeMode,
    calls: AtomicUsize,
    real_time_calls: AtomicUsize,
    current: AtomicUsize,
    peak: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl StubAnalyzer {
    pub fn new() -> Self {
        Self {
            result: joy(),
            real_time_result: vec![AnalysisLabel::new("surprise", 0.6, 0.4)],
            delay: Duration::ZERO,
            fail_on: Vec::new(),
            real_time: RealTimeMode::Unsupported,
            calls: AtomicUsize::new(0),
            real_time_calls: AtomicUsize::new(0),
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_result(mut self, result: AnalysisResult) -> Self {
        self.result = result;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_on(mut self, text: &str) -> Self {
        self.fail_on.push(text.to_string());
        self
    }

    pub fn with_real_time(mut self, mode: RealTimeMode) -> Self {
        self.real_time = mode;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn real_time_calls(&self) -> usize {
        self.real_time_calls.load(Ordering::SeqCst)
    }

    /// `analyze` calls currently running.
    pub fn active(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Payload texts in the order `analyze` was entered.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }

    pub fn real_time_result(&self) -> AnalysisResult {
        self.real_time_result.clone()
    }
}

fn text_of(payload: &Payload) -> String {
    match payload {
        Payload::Text(text) => text.clone(),
        Payload::Binary(bytes) => format!("<{} bytes>", bytes.len()),
    }
}

#[async_trait]
impl Analyzer for StubAnalyzer {
    async fn analyze(
        &self,
        payload: &Payload,
        _context: &AnalysisContext,
    ) -> Result<AnalysisResult, AnalyzerError> {
        let text = text_of(payload);
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(text.clone());
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.current.fetch_sub(1, Ordering::SeqCst);

        if self.fail_on.contains(&text) {
            return Err(AnalyzerError::Provider(format!("refused {}", text)));
        }
        Ok(self.result.clone())
    }

    async fn analyze_real_time(
        &self,
        _payload: &Payload,
        _context: &AnalysisContext,
    ) -> Result<AnalysisResult, AnalyzerError> {
        match self.real_time {
            RealTimeMode::Unsupported => Err(AnalyzerError::Unsupported),
            RealTimeMode::Succeed => {
                self.real_time_calls.fetch_add(1, Ordering::SeqCst);
                Ok(self.real_time_result.clone())
            }
            RealTimeMode::Fail => {
                self.real_time_calls.fetch_add(1, Ordering::SeqCst);
                Err(AnalyzerError::Provider("real-time endpoint unavailable".into()))
            }
        }
    }
}

pub fn joy() -> AnalysisResult {
    vec![AnalysisLabel::new("joy", 0.8, 0.7)]
}

/// Config with a short formation timeout and periodic load adjustment off.
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.batch_formation_timeout = Duration::from_millis(10);
    config.load.enabled = false;
    config
}

pub struct Harness {
    pub engine: AnalysisEngine,
    pub analyzer: Arc<StubAnalyzer>,
    pub metrics: Arc<MetricsStore>,
}

pub fn harness(config: EngineConfig, analyzer: StubAnalyzer) -> Harness {
    harness_with_load(config, analyzer, 0.3)
}

pub fn harness_with_load(config: EngineConfig, analyzer: StubAnalyzer, load: f64) -> Harness {
    let analyzer = Arc::new(analyzer);
    let metrics = Arc::new(MetricsStore::new());
    let collaborators = Collaborators::new(analyzer.clone())
        .with_metrics(metrics.clone())
        .with_load_probe(Arc::new(FixedLoadProbe(load)));
    let engine = AnalysisEngine::with_collaborators(config, collaborators).unwrap();
    Harness {
        engine,
        analyzer,
        metrics,
    }
}
