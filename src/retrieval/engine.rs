//! Retrieval engine: fetch, rerank, dedupe and pack within budget

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use super::index::{IndexClientConfig, IndexError, IndexQuery, SemanticIndex};
use super::rerank::{dedupe, pack_within_budget, rerank, RerankWeights};
use crate::context::models::RetrievedChunk;
use crate::context::token_estimator::TokenEstimator;
use crate::metrics::METRICS;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Raw candidates requested from the index
    pub top_k: usize,
    /// Upper bound for one index search, retries included
    pub timeout_ms: u64,
    pub semantic_weight: f32,
    pub lexical_weight: f32,
    pub index: IndexClientConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 24,
            timeout_ms: 1500,
            semantic_weight: 0.85,
            lexical_weight: 0.15,
            index: IndexClientConfig::default(),
        }
    }
}

impl RetrievalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn weights(&self) -> RerankWeights {
        RerankWeights {
            semantic: self.semantic_weight,
            lexical: self.lexical_weight,
        }
    }
}

/// Why retrieval came back without usable passages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedReason {
    Unavailable,
    Timeout,
    CircuitOpen,
    /// Every candidate failed to hydrate
    NoUsableCandidates,
}

impl DegradedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::Timeout => "timeout",
            Self::CircuitOpen => "circuit_open",
            Self::NoUsableCandidates => "no_usable_candidates",
        }
    }
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one retrieval call. Each call does fresh I/O; the chunk list is
/// finite and owned by the caller.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RetrievalOutcome {
    pub chunks: Vec<RetrievedChunk>,
    /// Set when the index could not serve this request
    pub degraded: Option<DegradedReason>,
    /// Raw candidates returned by the index
    pub candidates: usize,
    /// Ranked chunks left out to stay within budget
    pub dropped_for_budget: usize,
}

impl RetrievalOutcome {
    fn degraded(reason: DegradedReason) -> Self {
        Self {
            degraded: Some(reason),
            ..Default::default()
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

pub struct RetrievalEngine {
    index: Arc<dyn SemanticIndex>,
    config: RetrievalConfig,
    estimator: Arc<dyn TokenEstimator>,
}

impl RetrievalEngine {
    pub fn new(
        index: Arc<dyn SemanticIndex>,
        config: RetrievalConfig,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Self {
        Self {
            index,
            config,
            estimator,
        }
    }

    /// Never fails: backend problems come back as a degraded outcome
    #[instrument(skip(self, query))]
    pub async fn retrieve(
        &self,
        book_id: &str,
        chapter_idx: Option<u32>,
        query: &str,
        context_token_budget: usize,
    ) -> RetrievalOutcome {
        let start = Instant::now();
        let request = IndexQuery {
            book_id: book_id.to_string(),
            chapter_idx,
            query: query.to_string(),
            top_k: self.config.top_k,
        };

        let hits = match tokio::time::timeout(self.config.timeout(), self.index.search(&request)).await {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                let reason = match e {
                    IndexError::CircuitOpen => DegradedReason::CircuitOpen,
                    IndexError::Timeout(_) => DegradedReason::Timeout,
                    _ => DegradedReason::Unavailable,
                };
                warn!(error = %e, reason = %reason, "Semantic index failed, degrading");
                return self.finish_degraded(reason, start);
            }
            Err(_) => {
                warn!(timeout_ms = self.config.timeout_ms, "Semantic index timed out, degrading");
                return self.finish_degraded(DegradedReason::Timeout, start);
            }
        };

        let candidates = hits.len();
        let mut chunks = Vec::with_capacity(candidates);
        for hit in hits {
            match hit.text.filter(|t| !t.trim().is_empty()) {
                Some(text) => chunks.push(RetrievedChunk {
                    token_count: self.estimator.estimate(&text),
                    source_id: hit.source_id,
                    text,
                    relevance_score: hit.similarity,
                    position: hit.position,
                }),
                None => warn!(source_id = %hit.source_id, "Dropping candidate without text"),
            }
        }

        if candidates > 0 && chunks.is_empty() {
            return self.finish_degraded(DegradedReason::NoUsableCandidates, start);
        }

        let ranked = dedupe(rerank(query, chunks, self.config.weights()));
        let (chunks, dropped_for_budget) = pack_within_budget(ranked, context_token_budget);

        METRICS.record_retrieval("success", start.elapsed().as_secs_f64());
        debug!(
            candidates,
            packed = chunks.len(),
            dropped_for_budget,
            context_token_budget,
            "Retrieved passages"
        );

        RetrievalOutcome {
            chunks,
            degraded: None,
            candidates,
            dropped_for_budget,
        }
    }

    fn finish_degraded(&self, reason: DegradedReason, start: Instant) -> RetrievalOutcome {
        METRICS.record_retrieval("degraded", start.elapsed().as_secs_f64());
        METRICS.record_degraded(reason.as_str());
        RetrievalOutcome::degraded(reason)
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }
}
