//! Submission-time input validation.
//!
//! Inputs are checked synchronously before they touch the cache or the
//! queue. Invalid inputs are rejected, not truncated.

use super::analyzer::Payload;
use super::error::EngineError;
use crate::security::InputScreen;

/// Default maximum payload size in bytes (64KB).
pub const MAX_PAYLOAD_BYTES: usize = 65_536;

/// Limits applied to every submission.
#[derive(Debug, Clone)]
pub struct InputLimits {
    pub max_payload_bytes: usize,
    /// Run text payloads through the adversarial pattern screen.
    pub screen_adversarial: bool,
    /// Risk score (1-100) at which the screen blocks.
    pub block_threshold: u8,
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            max_payload_bytes: MAX_PAYLOAD_BYTES,
            screen_adversarial: true,
            block_threshold: 50,
        }
    }
}

/// Validates payloads against size limits and the adversarial screen.
#[derive(Debug, Clone)]
pub struct InputValidator {
    limits: InputLimits,
    screen: Option<InputScreen>,
}

impl InputValidator {
    pub fn new(limits: InputLimits, screen: Option<InputScreen>) -> Self {
        Self { limits, screen }
    }

    pub fn validate(&self, payload: &Payload) -> Result<(), EngineError> {
        if payload.is_empty() {
            return Err(EngineError::InputRejected("payload cannot be empty".into()));
        }
        if payload.byte_len() > self.limits.max_payload_bytes {
            return Err(EngineError::InputRejected(format!(
                "payload exceeds maximum size: {} > {} bytes",
                payload.byte_len(),
                self.limits.max_payload_bytes
            )));
        }
        let Some(text) = payload.as_text() else {
            return Ok(());
        };
        if text.trim().is_empty() {
            return Err(EngineError::InputRejected("payload is only whitespace".into()));
        }
        if let Some(screen) = &self.screen {
            let verdict = screen.scan(text);
            if !verdict.safe {
                return Err(EngineError::UnsafeInput {
                    risk_score: verdict.risk_score,
                    patterns: verdict.matched_patterns(),
                });
            }
        }
        Ok(())
    }
}
