//! Result caching for the analysis engine.
//!
//! Provides the bounded LRU+TTL result cache and its key derivation.

mod cache;
mod key;

pub use cache::{CacheConfig, ResultCache};
pub use key::{normalize_text, CacheKey};
