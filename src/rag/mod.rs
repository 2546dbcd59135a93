//! RAG processor: cache, retrieval and assembly for one chat turn

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheStats, Fingerprint, FingerprintInput, ResponseCache};
use crate::context::assembler::ContextAssembler;
use crate::context::models::{AssembledContext, Budget, BudgetStrategy, Query};
use crate::context::summarizer::Summarizer;
use crate::context::token_estimator::TokenEstimator;
use crate::error::{ContextError, Result};
use crate::retrieval::{DegradedReason, RetrievalEngine, RetrievalOutcome};

/// Inputs for one context build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRequest {
    pub query: Query,
    /// Budget to enforce; the baseline when optimization was skipped
    pub budget: Budget,
    /// Strategy that produced `budget`, part of the cache key
    pub strategy: BudgetStrategy,
    /// Prior conversation turns, oldest first
    #[serde(default)]
    pub history: Vec<String>,
}

impl ContextRequest {
    pub fn new(query: Query, budget: Budget, strategy: BudgetStrategy) -> Self {
        Self {
            query,
            budget,
            strategy,
            history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<String>) -> Self {
        self.history = history;
        self
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::compute(&FingerprintInput {
            book_id: &self.query.book_id,
            chapter_idx: self.query.chapter_idx,
            query_text: &self.query.text,
            selection: self.query.selection(),
            strategy: self.strategy,
            context_tokens: self.budget.context_tokens,
            history: &self.history,
        })
    }
}

/// Assembled context plus how it was obtained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuiltContext {
    pub context: AssembledContext,
    pub cache_hit: bool,
    /// Retrieval could not serve passages; context holds selection and
    /// history only
    pub degraded: Option<DegradedReason>,
    pub fingerprint: Fingerprint,
}

/// Degraded builds travel through the cache's error path so they are
/// shared with concurrent waiters but never stored.
struct DegradedBuild {
    context: AssembledContext,
    reason: DegradedReason,
}

pub struct RagProcessor {
    retrieval: RetrievalEngine,
    assembler: ContextAssembler,
    summarizer: Arc<dyn Summarizer>,
    cache: Arc<ResponseCache>,
    estimator: Arc<dyn TokenEstimator>,
}

impl RagProcessor {
    pub fn new(
        retrieval: RetrievalEngine,
        assembler: ContextAssembler,
        summarizer: Arc<dyn Summarizer>,
        cache: Arc<ResponseCache>,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Self {
        Self {
            retrieval,
            assembler,
            summarizer,
            cache,
            estimator,
        }
    }

    #[instrument(
        skip(self, request),
        fields(book_id = %request.query.book_id, strategy = %request.strategy)
    )]
    pub async fn build_context(&self, request: &ContextRequest) -> Result<BuiltContext> {
        request.query.validate()?;
        let fingerprint = request.fingerprint();

        match self
            .cache
            .get_or_try_compute(fingerprint.clone(), self.compute(request))
            .await
        {
            Ok((context, cache_hit)) => {
                debug!(
                    fingerprint = %fingerprint,
                    cache_hit,
                    token_count = context.token_count,
                    "Context ready"
                );
                Ok(BuiltContext {
                    context: context.as_ref().clone(),
                    cache_hit,
                    degraded: None,
                    fingerprint,
                })
            }
            Err(degraded) => Ok(BuiltContext {
                context: degraded.context.clone(),
                cache_hit: false,
                degraded: Some(degraded.reason),
                fingerprint,
            }),
        }
    }

    /// Race the build against `cancel`; in-flight retrieval is dropped when
    /// the caller goes away first
    pub async fn build_context_cancellable<C>(&self, request: &ContextRequest, cancel: C) -> Result<BuiltContext>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            result = self.build_context(request) => result,
            _ = cancel => {
                info!(book_id = %request.query.book_id, "Context build cancelled by client");
                Err(ContextError::Cancelled)
            }
        }
    }

    async fn compute(&self, request: &ContextRequest) -> std::result::Result<AssembledContext, DegradedBuild> {
        let query = &request.query;
        let selection = query.selection();

        let history = self
            .summarize_history(&request.history, self.assembler.history_cap(&request.budget))
            .await;

        let reserved = selection.map_or(0, |s| self.estimator.estimate(s))
            + history.as_deref().map_or(0, |h| self.estimator.estimate(h));
        let chunk_budget = request.budget.context_tokens.saturating_sub(reserved);

        // Nothing retrieved could be placed; spare the index the search
        let outcome = if chunk_budget == 0 {
            debug!(book_id = %query.book_id, reserved, "No room for passages, skipping retrieval");
            RetrievalOutcome::default()
        } else {
            self.retrieval
                .retrieve(&query.book_id, query.chapter_idx, &query.text, chunk_budget)
                .await
        };

        let context = self
            .assembler
            .assemble(selection, &outcome.chunks, history.as_deref(), &request.budget);

        match outcome.degraded {
            Some(reason) => Err(DegradedBuild { context, reason }),
            None => Ok(context),
        }
    }

    /// History failures are absorbed: the turn proceeds without history
    async fn summarize_history(&self, turns: &[String], max_tokens: usize) -> Option<String> {
        if turns.is_empty() || max_tokens == 0 {
            return None;
        }
        match self.summarizer.summarize(turns, max_tokens).await {
            Ok(summary) if !summary.trim().is_empty() => Some(summary),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "History summary unavailable");
                None
            }
        }
    }

    /// Explicit clear, used before benchmark runs for fair baselines
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::assembler::AssemblerConfig;
    use crate::context::summarizer::TruncatingSummarizer;
    use crate::context::token_estimator::WordBasedEstimator;
    use crate::retrieval::{IndexError, IndexHit, IndexQuery, InMemoryIndex, RetrievalConfig, SemanticIndex};
    use async_trait::async_trait;
    use std::time::Duration;

    struct StalledIndex;

    #[async_trait]
    impl SemanticIndex for StalledIndex {
        async fn search(&self, _query: &IndexQuery) -> std::result::Result<Vec<IndexHit>, IndexError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }
    }

    fn processor_with(index: Arc<dyn SemanticIndex>, timeout_ms: u64) -> RagProcessor {
        let estimator: Arc<dyn TokenEstimator> = Arc::new(WordBasedEstimator::default());
        let config = RetrievalConfig {
            timeout_ms,
            ..Default::default()
        };
        RagProcessor::new(
            RetrievalEngine::new(index, config, Arc::clone(&estimator)),
            ContextAssembler::new(AssemblerConfig::default(), Arc::clone(&estimator)),
            Arc::new(TruncatingSummarizer::new(Arc::clone(&estimator))),
            Arc::new(ResponseCache::default()),
            estimator,
        )
    }

    fn processor(index: Arc<dyn SemanticIndex>) -> RagProcessor {
        processor_with(index, 1000)
    }

    fn index() -> Arc<InMemoryIndex> {
        let index = InMemoryIndex::new();
        index.insert_chapter(
            "moby",
            1,
            "Call me Ishmael.\n\nThe white whale is the theme of obsession.\n\nAhab hunts the whale.",
        );
        Arc::new(index)
    }

    fn request(text: &str) -> ContextRequest {
        ContextRequest::new(
            Query::new(text, "moby").with_chapter(1),
            Budget::new(3200, 850),
            BudgetStrategy::Balanced,
        )
    }

    #[tokio::test]
    async fn test_build_then_hit() {
        let index = index();
        let processor = processor(index.clone());

        let first = processor.build_context(&request("whale theme")).await.unwrap();
        assert!(!first.cache_hit);
        assert!(first.degraded.is_none());
        assert_eq!(first.context.passage_count(), 2);

        let second = processor.build_context(&request("  Whale   THEME ")).await.unwrap();
        assert!(second.cache_hit);
        assert_eq!(second.context, first.context);
        assert_eq!(index.search_count(), 1);

        processor.clear_cache();
        let third = processor.build_context(&request("whale theme")).await.unwrap();
        assert!(!third.cache_hit);
        assert_eq!(index.search_count(), 2);
    }

    #[tokio::test]
    async fn test_history_is_placed_last() {
        let processor = processor(index());
        let req = request("whale").with_history(vec!["Who is Ishmael?".to_string()]);
        let built = processor.build_context(&req).await.unwrap();
        assert!(built.context.text.ends_with("Who is Ishmael?"));
    }

    #[tokio::test]
    async fn test_degraded_keeps_selection_and_is_not_cached() {
        let processor = processor_with(Arc::new(StalledIndex), 20);
        let mut req = request("whale");
        req.query = req.query.with_selection("It is not down in any map; true places never are.");

        let first = processor.build_context(&req).await.unwrap();
        assert_eq!(first.degraded, Some(DegradedReason::Timeout));
        assert!(first.context.contains_selection("It is not down in any map; true places never are."));
        assert_eq!(first.context.passage_count(), 0);

        let second = processor.build_context(&req).await.unwrap();
        assert!(!second.cache_hit);
        assert!(second.degraded.is_some());
    }

    #[tokio::test]
    async fn test_cancel_drops_in_flight_retrieval() {
        let processor = processor(Arc::new(StalledIndex));
        let err = processor
            .build_context_cancellable(&request("whale"), tokio::time::sleep(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::Cancelled));
    }

    #[tokio::test]
    async fn test_uncancelled_build_completes() {
        let processor = processor(index());
        let built = processor
            .build_context_cancellable(&request("whale"), std::future::pending())
            .await
            .unwrap();
        assert_eq!(built.context.passage_count(), 2);
    }

    #[tokio::test]
    async fn test_selection_filling_budget_skips_retrieval() {
        let index = index();
        let processor = processor(index.clone());
        let mut req = request("whale theme");
        req.budget = Budget::new(8, 850);
        req.query = req.query.with_selection("Call me Ishmael, some years ago, never mind how long.");

        let built = processor.build_context(&req).await.unwrap();
        assert_eq!(index.search_count(), 0);
        assert!(built.degraded.is_none());
        assert_eq!(built.context.passage_count(), 0);
        assert!(built.context.overrun);
    }

    #[tokio::test]
    async fn test_invalid_query_rejected() {
        let processor = processor(index());
        let err = processor.build_context(&request("")).await.unwrap_err();
        assert!(err.is_validation());
    }
}
