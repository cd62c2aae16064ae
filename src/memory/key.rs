//! Cache key derivation.
//!
//! Text payloads are normalized before hashing so that inputs differing only
//! in case, punctuation or spacing share an entry. Context is folded in via
//! its canonical serialization.

use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

use crate::engine::{AnalysisContext, Payload};

const TEXT_TAG: u8 = b't';
const BINARY_TAG: u8 = b'b';
const CONTEXT_SEPARATOR: u8 = 0x00;

/// SHA-256 digest identifying one cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Derive the key for `payload`, optionally mixing in `context`.
    pub fn derive(payload: &Payload, context: &AnalysisContext, include_context: bool) -> Self {
        let mut hasher = Sha256::new();
        match payload {
            Payload::Text(text) => {
                hasher.update([TEXT_TAG]);
                hasher.update(normalize_text(text).as_bytes());
            }
            Payload::Binary(bytes) => {
                hasher.update([BINARY_TAG]);
                hasher.update(bytes);
            }
        }
        if include_context && !context.is_empty() {
            hasher.update([CONTEXT_SEPARATOR]);
            hasher.update(context.canonical_bytes());
        }
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short hex prefix for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Compatibility-fold, lowercase, drop punctuation and collapse whitespace.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.nfkc().flat_map(char::to_lowercase) {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if !c.is_alphanumeric() {
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_folds_case_and_punctuation() {
        assert_eq!(normalize_text("Hello World!"), "hello world");
        assert_eq!(normalize_text("  hello,\t\tworld  "), "hello world");
        assert_eq!(normalize_text("HELLO...  WORLD?!"), "hello world");
    }

    #[test]
    fn normalization_keeps_non_ascii_letters() {
        assert_eq!(normalize_text("Ça  VA?"), "ça va");
        assert_eq!(normalize_text("ｈｅｌｌｏ"), "hello");
    }

    #[test]
    fn punctuation_only_gap_does_not_merge_words() {
        assert_eq!(normalize_text("one - two"), "one two");
        assert_eq!(normalize_text("don't"), "dont");
    }

    #[test]
    fn equivalent_text_shares_key() {
        let ctx = AnalysisContext::new();
        let a = CacheKey::derive(&Payload::from("hello world"), &ctx, true);
        let b = CacheKey::derive(&Payload::from("Hello World!"), &ctx, true);
        assert_eq!(a, b);
    }

    #[test]
    fn context_changes_key_only_when_included() {
        let payload = Payload::from("hello");
        let alice = AnalysisContext::new().with("user", "alice");
        let bob = AnalysisContext::new().with("user", "bob");

        assert_ne!(
            CacheKey::derive(&payload, &alice, true),
            CacheKey::derive(&payload, &bob, true)
        );
        assert_eq!(
            CacheKey::derive(&payload, &alice, false),
            CacheKey::derive(&payload, &bob, false)
        );
    }

    #[test]
    fn context_insertion_order_is_irrelevant() {
        let payload = Payload::from("hello");
        let mut first = AnalysisContext::new();
        first.insert("a", "1");
        first.insert("b", "2");
        let mut second = AnalysisContext::new();
        second.insert("b", "2");
        second.insert("a", "1");
        assert_eq!(
            CacheKey::derive(&payload, &first, true),
            CacheKey::derive(&payload, &second, true)
        );
    }

    #[test]
    fn binary_and_text_never_collide() {
        let ctx = AnalysisContext::new();
        let text = CacheKey::derive(&Payload::from("abc"), &ctx, true);
        let bin = CacheKey::derive(&Payload::Binary(b"abc".to_vec()), &ctx, true);
        assert_ne!(text, bin);
    }
}
