//! Semantic index clients
//!
//! The vector index itself is an external collaborator. `HttpSemanticIndex`
//! talks to it over HTTP with retries and a circuit breaker;
//! `InMemoryIndex` is a lexical stand-in for local runs and tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, error, warn};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use super::rerank::terms;

/// Semantic index errors
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Circuit breaker is open")]
    CircuitOpen,

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Upstream error: {0}")]
    UpstreamError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexQuery {
    pub book_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_idx: Option<u32>,
    pub query: String,
    pub top_k: usize,
}

/// Raw candidate from the index.
///
/// `text` is absent when the index matched a passage it could not hydrate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    pub source_id: String,
    #[serde(default)]
    pub text: Option<String>,
    pub similarity: f32,
    #[serde(default)]
    pub position: usize,
}

/// External semantic index
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    async fn search(&self, query: &IndexQuery) -> Result<Vec<IndexHit>, IndexError>;
}

/// HTTP index client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexClientConfig {
    /// Base URL; unset means no remote index is configured
    pub url: Option<String>,
    pub api_key: Option<SecretString>,
    pub request_timeout_ms: u64,
    pub retry_attempts: usize,
    pub retry_backoff_ms: u64,
    pub circuit_breaker_failures: usize,
    pub circuit_breaker_reset_secs: u64,
}

impl Default for IndexClientConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            request_timeout_ms: 1000,
            retry_attempts: 1,
            retry_backoff_ms: 100,
            circuit_breaker_failures: 5,
            circuit_breaker_reset_secs: 30,
        }
    }
}

impl IndexClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn breaker_reset_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_reset_secs)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Vec<IndexHit>,
}

/// Index reached over HTTP: `POST {url}/v1/search`
pub struct HttpSemanticIndex {
    http: Client,
    base_url: String,
    config: IndexClientConfig,
    breaker: CircuitBreaker,
}

impl HttpSemanticIndex {
    pub fn new(base_url: impl Into<String>, config: IndexClientConfig) -> Result<Self, IndexError> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| IndexError::RequestFailed(e.to_string()))?;

        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: config.circuit_breaker_failures,
            reset_timeout: config.breaker_reset_timeout(),
        });

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            config,
            breaker,
        })
    }

    async fn call_search(&self, query: &IndexQuery) -> Result<Vec<IndexHit>, IndexError> {
        let url = format!("{}/v1/search", self.base_url);
        let mut req = self.http.post(&url).json(query);

        if let Some(api_key) = &self.config.api_key {
            req = req.bearer_auth(api_key.expose_secret());
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                IndexError::Timeout(e.to_string())
            } else {
                IndexError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(IndexError::UpstreamError(format!(
                "Status {}: {}",
                status, error_text
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| IndexError::InvalidResponse(e.to_string()))?;

        Ok(body.hits)
    }

    /// Exponential backoff for the given 1-based attempt
    fn calculate_backoff(&self, attempt: usize) -> Duration {
        let multiplier = 2_u32.saturating_pow(attempt.saturating_sub(1) as u32);
        self.config.retry_backoff().saturating_mul(multiplier)
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[async_trait]
impl SemanticIndex for HttpSemanticIndex {
    async fn search(&self, query: &IndexQuery) -> Result<Vec<IndexHit>, IndexError> {
        if self.breaker.is_open() {
            return Err(IndexError::CircuitOpen);
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.call_search(query).await {
                Ok(hits) => {
                    self.breaker.mark_success();
                    debug!(book_id = %query.book_id, hits = hits.len(), "Index search succeeded");
                    return Ok(hits);
                }
                Err(e) => {
                    self.breaker.mark_failure();

                    if attempt > self.config.retry_attempts || self.breaker.is_open() {
                        error!("Index search failed after {} attempts: {}", attempt, e);
                        return Err(e);
                    }

                    let backoff = self.calculate_backoff(attempt);
                    warn!(
                        "Index search attempt {} failed: {}, retrying in {:?}",
                        attempt, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

/// Passage stored in the in-memory index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedPassage {
    pub source_id: String,
    pub chapter_idx: u32,
    pub position: usize,
    pub text: String,
}

/// Lexical in-process index: similarity is the share of query terms a
/// passage contains.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    books: RwLock<HashMap<String, Vec<IndexedPassage>>>,
    searches: AtomicUsize,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, book_id: impl Into<String>, passage: IndexedPassage) {
        self.books.write().entry(book_id.into()).or_default().push(passage);
    }

    /// Split a chapter into paragraph passages keyed `{book}:{chapter}:{n}`.
    /// Positions are character offsets into `text`.
    pub fn insert_chapter(&self, book_id: &str, chapter_idx: u32, text: &str) {
        let mut position = 0;
        for (n, paragraph) in text.split("\n\n").enumerate() {
            let trimmed = paragraph.trim();
            if !trimmed.is_empty() {
                let leading = paragraph.len() - paragraph.trim_start().len();
                let offset = paragraph[..leading].chars().count();
                self.insert(
                    book_id,
                    IndexedPassage {
                        source_id: format!("{}:{}:{}", book_id, chapter_idx, n),
                        chapter_idx,
                        position: position + offset,
                        text: trimmed.to_string(),
                    },
                );
            }
            position += paragraph.chars().count() + 2;
        }
    }

    /// Number of searches served
    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SemanticIndex for InMemoryIndex {
    async fn search(&self, query: &IndexQuery) -> Result<Vec<IndexHit>, IndexError> {
        self.searches.fetch_add(1, Ordering::SeqCst);

        let query_terms = terms(&query.query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let books = self.books.read();
        let Some(passages) = books.get(&query.book_id) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<IndexHit> = passages
            .iter()
            .filter(|p| query.chapter_idx.map_or(true, |c| c == p.chapter_idx))
            .filter_map(|p| {
                let passage_terms: HashSet<String> = terms(&p.text);
                let matched = query_terms.intersection(&passage_terms).count();
                (matched > 0).then(|| IndexHit {
                    source_id: p.source_id.clone(),
                    text: Some(p.text.clone()),
                    similarity: matched as f32 / query_terms.len() as f32,
                    position: p.position,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.source_id.cmp(&b.source_id))
        });
        hits.truncate(query.top_k);
        Ok(hits)
    }
}
