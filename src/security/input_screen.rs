//! Adversarial input screening.
//!
//! Detects known adversarial patterns in text payloads before they are
//! admitted to the queue. Uses Aho-Corasick automata so a scan is a single
//! pass over the input regardless of pattern count.

use std::sync::Arc;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, BuildError};

/// Patterns that raise the risk score of an input.
const SUSPICIOUS_PATTERNS: &[&str] = &[
    // Instruction override aimed at the backend model
    "ignore previous instructions",
    "ignore all previous",
    "disregard all previous",
    "disregard the above",
    "forget your instructions",
    "forget previous instructions",
    "override instructions",
    "override previous",
    "new instructions:",
    "new directive:",
    // Prompt extraction
    "repeat your instructions",
    "print your instructions",
    "reveal your system prompt",
    "what is your system prompt",
    // Role manipulation
    "you are now",
    "from now on you are",
    "pretend you are",
    "developer mode",
    "do anything now",
    // Indirect injection markers
    "<system>",
    "</system>",
    "<instruction>",
    "</instruction>",
    "<|im_start|>",
    "<|endoftext|>",
    // Script payloads
    "<script",
    "javascript:",
];

/// Patterns that block on their own.
const HIGH_RISK_PATTERNS: &[&str] = &[
    "ignore all previous instructions",
    "disregard all previous instructions",
    "you are now in developer mode",
    "do anything now",
    "jailbreak",
];

const HIGH_RISK_SCORE: u8 = 40;
const DEFAULT_BLOCK_THRESHOLD: u8 = 50;

/// One detected pattern occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenMatch {
    pub pattern: String,
    pub start: usize,
    pub end: usize,
    /// Severity 1-5.
    pub severity: u8,
}

/// Outcome of screening one input.
#[derive(Debug, Clone)]
pub struct ScreenVerdict {
    pub safe: bool,
    /// 0-100.
    pub risk_score: u8,
    pub matches: Vec<ScreenMatch>,
}

impl ScreenVerdict {
    pub fn matched_patterns(&self) -> Vec<String> {
        self.matches.iter().map(|m| m.pattern.clone()).collect()
    }
}

/// Compiled adversarial pattern screen.
#[derive(Clone)]
pub struct InputScreen {
    matcher: Arc<AhoCorasick>,
    high_risk: Arc<AhoCorasick>,
    block_threshold: u8,
}

impl std::fmt::Debug for InputScreen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputScreen")
            .field("block_threshold", &self.block_threshold)
            .finish()
    }
}

impl InputScreen {
    /// Build the screen with the default block threshold.
    pub fn new() -> Result<Self, BuildError> {
        Self::with_threshold(DEFAULT_BLOCK_THRESHOLD)
    }

    /// Build the screen blocking at `block_threshold` (1-100).
    pub fn with_threshold(block_threshold: u8) -> Result<Self, BuildError> {
        let matcher = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .build(SUSPICIOUS_PATTERNS)?;
        let high_risk = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .build(HIGH_RISK_PATTERNS)?;

        Ok(Self {
            matcher: Arc::new(matcher),
            high_risk: Arc::new(high_risk),
            block_threshold: block_threshold.clamp(1, 100),
        })
    }

    pub fn block_threshold(&self) -> u8 {
        self.block_threshold
    }

    /// Scan `text` and decide whether it may be admitted.
    pub fn scan(&self, text: &str) -> ScreenVerdict {
        let mut matches = Vec::new();
        let mut risk_score = 0u8;
        let mut high_risk_hit = false;

        for m in self.high_risk.find_iter(text) {
            matches.push(ScreenMatch {
                pattern: text[m.start()..m.end()].to_string(),
                start: m.start(),
                end: m.end(),
                severity: 5,
            });
            risk_score = risk_score.saturating_add(HIGH_RISK_SCORE);
            high_risk_hit = true;
        }

        for m in self.matcher.find_iter(text) {
            // Overlaps with a high-risk hit are already scored.
            if matches.iter().any(|hit| m.start() < hit.end && hit.start < m.end()) {
                continue;
            }
            let matched = &text[m.start()..m.end()];
            let severity = classify_severity(matched);
            matches.push(ScreenMatch {
                pattern: matched.to_string(),
                start: m.start(),
                end: m.end(),
                severity,
            });
            risk_score = risk_score.saturating_add(severity * 5);
        }

        if has_control_characters(text) {
            matches.push(ScreenMatch {
                pattern: "control characters".to_string(),
                start: 0,
                end: 0,
                severity: 2,
            });
            risk_score = risk_score.saturating_add(10);
        }

        let risk_score = risk_score.min(100);
        let safe = !high_risk_hit && risk_score < self.block_threshold;

        ScreenVerdict {
            safe,
            risk_score,
            matches,
        }
    }
}

fn classify_severity(pattern: &str) -> u8 {
    let lower = pattern.to_ascii_lowercase();
    if lower.contains("ignore") || lower.contains("override") || lower.contains("disregard") {
        return 5;
    }
    if lower.contains("instruction") || lower.contains("prompt") || lower.contains("<script") {
        return 4;
    }
    if lower.contains("you are") || lower.contains("pretend") || lower.contains("mode") {
        return 3;
    }
    2
}

/// Non-whitespace C0 controls other than tab/newline/carriage return.
fn has_control_characters(text: &str) -> bool {
    text.chars()
        .any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
}
