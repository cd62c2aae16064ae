//! analysis-core command-line entry point.
//!
//! ## Subcommands
//!
//! - `analysis-core-cli run [--config FILE]` - analyze stdin lines through the
//!   engine with the demonstration analyzer, one JSON result per line, then a
//!   status, health and metrics summary
//! - `analysis-core-cli config [--config FILE]` - print the effective
//!   configuration as JSON
//!
//! A line may carry a priority prefix: `realtime:`, `high:`, `medium:` or
//! `low:`. Lines without one are submitted at medium priority.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

use analysis_core::config as core_config;
use analysis_core::engine::{
    AnalysisContext, AnalysisLabel, AnalysisResult, Analyzer, AnalyzerError, Payload,
};
use analysis_core::memory::normalize_text;
use analysis_core::telemetry::{init_logging, LogConfig, MetricsStore};
use analysis_core::{AnalysisEngine, Collaborators, ConfigError, EngineConfig, Priority};

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    match command {
        "run" => {
            if let Err(e) = init_logging(&LogConfig::from_env()) {
                eprintln!("Logging setup failed: {}", e);
            }
            let config = match load_config(&args) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Configuration error: {}", e);
                    return ExitCode::FAILURE;
                }
            };
            match run(config).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        "config" => match load_config(&args) {
            Ok(config) => {
                if let Err(e) = config.validate() {
                    eprintln!("Configuration error: {}", e);
                    return ExitCode::FAILURE;
                }
                print_json(&config.effective());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Configuration error: {}", e);
                ExitCode::FAILURE
            }
        },
        "version" | "--version" | "-V" => {
            println!("analysis-core {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    println!("analysis-core {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("USAGE:");
    println!("    analysis-core-cli <COMMAND> [--config FILE]");
    println!();
    println!("COMMANDS:");
    println!("    run       Analyze stdin lines and print JSON results");
    println!("    config    Print the effective configuration");
    println!("    version   Print version");
    println!("    help      Print this message");
    println!();
    println!("Environment variables prefixed ANALYSIS_CORE_ override configuration.");
}

fn load_config(args: &[String]) -> Result<EngineConfig, ConfigError> {
    let file = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1));
    match file {
        Some(path) => core_config::load_file(path),
        None => Ok(core_config::load()),
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{}", line),
        Err(e) => eprintln!("Serialization failed: {}", e),
    }
}

fn split_priority(line: &str) -> (Priority, &str) {
    for (prefix, priority) in [
        ("realtime:", Priority::RealTime),
        ("high:", Priority::High),
        ("medium:", Priority::Medium),
        ("low:", Priority::Low),
    ] {
        if let Some(rest) = line.strip_prefix(prefix) {
            return (priority, rest.trim_start());
        }
    }
    (Priority::Medium, line)
}

async fn run(config: EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown_timeout = config.shutdown_timeout;
    let metrics = Arc::new(MetricsStore::new());
    let collaborators =
        Collaborators::new(Arc::new(LexiconAnalyzer::default())).with_metrics(metrics.clone());
    let engine = AnalysisEngine::with_collaborators(config, collaborators)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tasks = Vec::new();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            let (priority, text) = split_priority(&line);
            let payload = Payload::from(text);
            let result = if priority.is_real_time() {
                engine.submit_real_time(payload, AnalysisContext::new()).await
            } else {
                engine.submit(payload, AnalysisContext::new(), priority).await
            };
            match result {
                Ok(labels) => serde_json::json!({
                    "input": line,
                    "priority": priority,
                    "labels": labels,
                }),
                Err(e) => {
                    let kind = if e.is_client_error() {
                        "rejected"
                    } else if e.is_analyzer_failure() {
                        "analyzer"
                    } else {
                        "engine"
                    };
                    serde_json::json!({
                        "input": line,
                        "priority": priority,
                        "error": e.to_string(),
                        "kind": kind,
                    })
                }
            }
        }));
    }

    for task in tasks {
        print_json(&task.await?);
    }

    print_json(&serde_json::json!({ "status": engine.status() }));
    print_json(&serde_json::json!({ "health": engine.health() }));
    let result = engine.shutdown(shutdown_timeout).await;
    print_json(&serde_json::json!({ "shutdown": result }));
    print_json(&serde_json::json!({ "metrics": metrics.snapshot() }));
    Ok(())
}

const LEXICON: &[(&str, &[&str])] = &[
    ("joy", &["happy", "glad", "great", "love", "hello"]),
    ("sadness", &["sad", "lonely", "tired", "miss"]),
    ("anger", &["angry", "hate", "unfair", "annoyed"]),
    ("fear", &["afraid", "worried", "scared", "anxious"]),
];

/// Demonstration analyzer: scores a handful of emotion words with a small
/// simulated delay on the standard path.
struct LexiconAnalyzer {
    delay: Duration,
}

impl Default for LexiconAnalyzer {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(20),
        }
    }
}

impl LexiconAnalyzer {
    fn score(&self, text: &str) -> AnalysisResult {
        let normalized = normalize_text(text);
        let words: Vec<&str> = normalized.split(' ').collect();
        let total = words.len().max(1) as f32;
        LEXICON
            .iter()
            .filter_map(|(label, cues)| {
                let hits = words.iter().filter(|w| cues.contains(*w)).count();
                (hits > 0).then(|| {
                    let intensity = (hits as f32 / total).min(1.0);
                    let confidence = (0.5 + 0.1 * hits as f32).min(0.95);
                    AnalysisLabel::new(*label, confidence, intensity)
                })
            })
            .collect()
    }
}

#[async_trait]
impl Analyzer for LexiconAnalyzer {
    async fn analyze(
        &self,
        payload: &Payload,
        _context: &AnalysisContext,
    ) -> Result<AnalysisResult, AnalyzerError> {
        tokio::time::sleep(self.delay).await;
        match payload.as_text() {
            Some(text) => Ok(self.score(text)),
            None => Err(AnalyzerError::Provider("binary payloads are not supported".into())),
        }
    }

    async fn analyze_real_time(
        &self,
        payload: &Payload,
        _context: &AnalysisContext,
    ) -> Result<AnalysisResult, AnalyzerError> {
        match payload.as_text() {
            Some(text) => Ok(self.score(text)),
            None => Err(AnalyzerError::Unsupported),
        }
    }
}
