//! Fuzz target for cache key derivation.
//!
//! Normalization must be idempotent, and text differing only in case or
//! punctuation must map to the same key.

#![no_main]

use libfuzzer_sys::fuzz_target;
use analysis_core::engine::{AnalysisContext, Payload};
use analysis_core::memory::{normalize_text, CacheKey};

fuzz_target!(|data: &[u8]| {
    let context = AnalysisContext::new().with("fuzz", "1");

    // Binary payloads hash as-is.
    let _ = CacheKey::derive(&Payload::from(data.to_vec()), &context, true);

    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let once = normalize_text(text);
    assert_eq!(normalize_text(&once), once, "normalization not idempotent");

    let key = CacheKey::derive(&Payload::from(text), &context, true);
    let normalized = CacheKey::derive(&Payload::from(once.as_str()), &context, true);
    assert_eq!(key, normalized, "text and its normal form keyed differently");
});
