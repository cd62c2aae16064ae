//! Tests for the LRU+TTL result cache and key derivation.

use std::time::Duration;

use analysis_core::engine::{AnalysisContext, AnalysisLabel, Payload};
use analysis_core::memory::{normalize_text, CacheConfig, CacheKey, ResultCache};

fn cache(max_entries: usize) -> ResultCache {
    ResultCache::new(CacheConfig {
        max_entries,
        ..Default::default()
    })
}

fn label(name: &str) -> Vec<AnalysisLabel> {
    vec![AnalysisLabel::new(name, 0.5, 0.5)]
}

fn text(s: &str) -> Payload {
    Payload::from(s)
}

#[test]
fn normalized_variants_share_an_entry() {
    let cache = cache(10);
    let ctx = AnalysisContext::new();
    cache.store(&text("hello world"), &ctx, label("joy"));

    assert_eq!(cache.lookup(&text("Hello   World!"), &ctx), Some(label("joy")));
    assert_eq!(cache.lookup(&text("  HELLO, world.  "), &ctx), Some(label("joy")));
    assert_eq!(cache.lookup(&text("hello worlds"), &ctx), None);
}

#[test]
fn context_participates_in_key_when_enabled() {
    let alice = AnalysisContext::new().with("user", "alice");
    let bob = AnalysisContext::new().with("user", "bob");

    let with_context = cache(10);
    with_context.store(&text("hi"), &alice, label("joy"));
    assert!(with_context.lookup(&text("hi"), &bob).is_none());
    assert!(with_context.lookup(&text("hi"), &alice).is_some());

    let without_context = ResultCache::new(CacheConfig {
        include_context: false,
        ..Default::default()
    });
    without_context.store(&text("hi"), &alice, label("joy"));
    assert!(without_context.lookup(&text("hi"), &bob).is_some());
}

#[test]
fn context_key_is_order_independent() {
    let mut a = AnalysisContext::new();
    a.insert("session", "s1");
    a.insert("user", "u1");
    let b = AnalysisContext::new().with("user", "u1").with("session", "s1");

    let payload = text("same");
    assert_eq!(
        CacheKey::derive(&payload, &a, true),
        CacheKey::derive(&payload, &b, true)
    );
}

#[test]
fn binary_payloads_are_not_normalized() {
    let ctx = AnalysisContext::new();
    let upper = CacheKey::derive(&Payload::from(b"ABC".to_vec()), &ctx, true);
    let lower = CacheKey::derive(&Payload::from(b"abc".to_vec()), &ctx, true);
    let as_text = CacheKey::derive(&text("abc"), &ctx, true);

    assert_ne!(upper, lower);
    assert_ne!(lower, as_text);
}

#[test]
fn expired_entry_is_absent_and_removed() {
    let cache = ResultCache::new(CacheConfig {
        ttl: Duration::from_millis(30),
        ..Default::default()
    });
    let ctx = AnalysisContext::new();
    cache.store(&text("brief"), &ctx, label("joy"));
    assert_eq!(cache.len(), 1);

    std::thread::sleep(Duration::from_millis(50));

    assert!(cache.lookup(&text("brief"), &ctx).is_none());
    assert_eq!(cache.len(), 0);
}

#[test]
fn purge_removes_only_expired_entries() {
    let cache = ResultCache::new(CacheConfig {
        ttl: Duration::from_millis(40),
        ..Default::default()
    });
    let ctx = AnalysisContext::new();
    cache.store(&text("old"), &ctx, label("a"));
    std::thread::sleep(Duration::from_millis(60));
    cache.store(&text("new"), &ctx, label("b"));

    assert_eq!(cache.purge_expired(), 1);
    assert_eq!(cache.len(), 1);
    assert!(cache.lookup(&text("new"), &ctx).is_some());
}

#[test]
fn lru_bound_evicts_least_recently_accessed() {
    let cache = cache(3);
    let ctx = AnalysisContext::new();
    for name in ["a", "b", "c"] {
        cache.store(&text(name), &ctx, label(name));
    }
    // Touch "a" so "b" and "c" become the oldest.
    assert!(cache.lookup(&text("a"), &ctx).is_some());

    cache.store(&text("d"), &ctx, label("d"));
    cache.store(&text("e"), &ctx, label("e"));

    assert_eq!(cache.len(), 3);
    assert_eq!(cache.evictions(), 2);
    assert!(cache.lookup(&text("a"), &ctx).is_some());
    assert!(cache.lookup(&text("b"), &ctx).is_none());
    assert!(cache.lookup(&text("c"), &ctx).is_none());
    assert!(cache.lookup(&text("d"), &ctx).is_some());
    assert!(cache.lookup(&text("e"), &ctx).is_some());
}

#[test]
fn overwriting_existing_key_does_not_evict() {
    let cache = cache(2);
    let ctx = AnalysisContext::new();
    cache.store(&text("a"), &ctx, label("one"));
    cache.store(&text("b"), &ctx, label("two"));
    cache.store(&text("a"), &ctx, label("three"));

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.evictions(), 0);
    assert_eq!(cache.lookup(&text("a"), &ctx), Some(label("three")));
}

#[test]
fn returned_values_are_copies() {
    let cache = cache(4);
    let ctx = AnalysisContext::new();
    cache.store(&text("x"), &ctx, label("joy"));

    let mut copy = cache.lookup(&text("x"), &ctx).unwrap();
    copy.push(AnalysisLabel::new("anger", 1.0, 1.0));

    assert_eq!(cache.lookup(&text("x"), &ctx), Some(label("joy")));
}

#[test]
fn hit_rate_ignores_rechecks() {
    let cache = cache(4);
    let ctx = AnalysisContext::new();
    let key = cache.key_for(&text("x"), &ctx);

    assert!(cache.lookup_key(&key).is_none());
    cache.store_key(key, label("joy"));
    assert!(cache.recheck_key(&key).is_some());
    assert!(cache.lookup_key(&key).is_some());

    assert_eq!(cache.hits(), 1);
    assert_eq!(cache.misses(), 1);
    assert!((cache.hit_rate() - 0.5).abs() < f64::EPSILON);
}

#[test]
fn clear_empties_cache() {
    let cache = cache(4);
    let ctx = AnalysisContext::new();
    cache.store(&text("x"), &ctx, label("joy"));
    cache.clear();
    assert!(cache.is_empty());
}

#[test]
fn normalization_rules() {
    assert_eq!(normalize_text("  Hello,   World!! "), "hello world");
    assert_eq!(normalize_text("ＦＵＬＬ width"), "full width");
    assert_eq!(normalize_text("tabs\tand\nnewlines"), "tabs and newlines");
    assert_eq!(normalize_text("?!."), "");
}
