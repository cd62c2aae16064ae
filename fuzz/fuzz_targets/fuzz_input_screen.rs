//! Fuzz target for adversarial input screening.
//!
//! Arbitrary strings must never panic the screen, and every verdict must be
//! internally consistent.

#![no_main]

use libfuzzer_sys::fuzz_target;
use analysis_core::security::InputScreen;

fuzz_target!(|data: &str| {
    let Ok(screen) = InputScreen::new() else {
        return;
    };

    let verdict = screen.scan(data);

    assert!(verdict.risk_score <= 100, "risk score out of range");
    if verdict.matches.is_empty() {
        assert!(verdict.safe, "unsafe verdict without matches");
        assert_eq!(verdict.risk_score, 0);
    }
    for m in &verdict.matches {
        assert!(m.start <= m.end && m.end <= data.len(), "match span out of bounds");
        assert!((1..=5).contains(&m.severity), "severity out of range");
    }
});
