//! Content-addressed cache of assembled contexts
//!
//! Keys are SHA-256 fingerprints over every input that shapes an assembled
//! context. Concurrent requests for the same fingerprint share a single
//! computation.

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::context::models::{AssembledContext, BudgetStrategy};
use crate::metrics::METRICS;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 600,
            max_capacity: 10_000,
        }
    }
}

/// Lowercase and collapse whitespace
pub fn normalize_query(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Inputs that determine an assembled context
#[derive(Debug, Clone, Copy)]
pub struct FingerprintInput<'a> {
    pub book_id: &'a str,
    pub chapter_idx: Option<u32>,
    pub query_text: &'a str,
    pub selection: Option<&'a str>,
    pub strategy: BudgetStrategy,
    pub context_tokens: usize,
    pub history: &'a [String],
}

/// Deterministic cache key (hex SHA-256)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(input: &FingerprintInput<'_>) -> Self {
        // Selection is hashed verbatim: it is placed in the context unchanged
        let selection_hash = input
            .selection
            .map(|s| sha256_hex(s.as_bytes()))
            .unwrap_or_default();
        let history_hash = if input.history.is_empty() {
            String::new()
        } else {
            sha256_hex(input.history.join("\u{1e}").as_bytes())
        };
        let chapter = input
            .chapter_idx
            .map(|c| c.to_string())
            .unwrap_or_default();

        let mut hasher = Sha256::new();
        for field in [
            input.book_id,
            chapter.as_str(),
            normalize_query(input.query_text).as_str(),
            selection_hash.as_str(),
            input.strategy.as_str(),
            input.context_tokens.to_string().as_str(),
            history_hash.as_str(),
        ] {
            hasher.update(field.as_bytes());
            hasher.update(b"\x1f");
        }

        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub entry_count: u64,
}

pub struct ResponseCache {
    cache: Cache<Fingerprint, Arc<AssembledContext>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(Duration::from_secs(config.ttl_secs))
            .build();

        Self {
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn count(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        METRICS.record_cache(hit);
    }

    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<AssembledContext>> {
        let value = self.cache.get(fingerprint).await;
        self.count(value.is_some());
        value
    }

    pub async fn put(&self, fingerprint: Fingerprint, context: AssembledContext) {
        self.cache.insert(fingerprint, Arc::new(context)).await;
    }

    /// Return the cached context, or run `init` once per fingerprint.
    ///
    /// Callers arriving while `init` is in flight wait for it and share its
    /// result. Errors are handed to every waiter and are not cached. The
    /// flag is true when this caller did not run `init`.
    pub async fn get_or_try_compute<F, E>(
        &self,
        fingerprint: Fingerprint,
        init: F,
    ) -> Result<(Arc<AssembledContext>, bool), Arc<E>>
    where
        F: Future<Output = Result<AssembledContext, E>>,
        E: Send + Sync + 'static,
    {
        let computed = AtomicBool::new(false);
        let result = self
            .cache
            .try_get_with(fingerprint, async {
                computed.store(true, Ordering::SeqCst);
                init.await.map(Arc::new)
            })
            .await;

        let hit = !computed.load(Ordering::SeqCst);
        self.count(hit);
        result.map(|context| (context, hit))
    }

    pub async fn invalidate(&self, fingerprint: &Fingerprint) {
        self.cache.invalidate(fingerprint).await;
    }

    /// Drop every entry; the next lookup of any fingerprint misses
    pub fn clear(&self) {
        self.cache.invalidate_all();
        info!("Context cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        debug!(hits, misses, "Cache stats requested");

        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            entry_count: self.cache.entry_count(),
        }
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}
