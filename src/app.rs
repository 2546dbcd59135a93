//! Wiring of the optimizer and RAG pipeline from configuration

use std::sync::Arc;
use tracing::{info, warn};

use crate::api::AppState;
use crate::cache::ResponseCache;
use crate::config::Config;
use crate::context::{
    build_summarizer, BudgetOptimizer, BudgetStrategyEngine, ComplexityClassifier, ContextAssembler,
    TokenEstimator,
};
use crate::error::Result;
use crate::quality::QualityImpactModel;
use crate::rag::RagProcessor;
use crate::retrieval::{HttpSemanticIndex, InMemoryIndex, RetrievalEngine, SemanticIndex};
use crate::stats::OptimizationStatsRecorder;
use crate::toggles::FeatureToggleStore;

pub fn build_optimizer(config: &Config, estimator: Arc<dyn TokenEstimator>) -> Result<BudgetOptimizer> {
    let engine = BudgetStrategyEngine::new(
        config.budget.clone(),
        QualityImpactModel::new(config.quality.clone()),
        estimator,
    )?;

    Ok(BudgetOptimizer::new(
        ComplexityClassifier::new(config.classifier.clone()),
        engine,
        Arc::new(FeatureToggleStore::new(config.toggles.clone())),
        Arc::new(OptimizationStatsRecorder::new()),
    ))
}

/// Remote index when a URL is configured, an empty in-process one otherwise
pub fn build_index(config: &Config) -> Result<Arc<dyn SemanticIndex>> {
    match &config.retrieval.index.url {
        Some(url) => {
            info!(url = %url, "Using remote semantic index");
            Ok(Arc::new(HttpSemanticIndex::new(url.clone(), config.retrieval.index.clone())?))
        }
        None => {
            warn!("No semantic index URL configured, using in-process index");
            Ok(Arc::new(InMemoryIndex::new()))
        }
    }
}

pub fn build_processor(
    config: &Config,
    index: Arc<dyn SemanticIndex>,
    estimator: Arc<dyn TokenEstimator>,
) -> Result<RagProcessor> {
    let summarizer = build_summarizer(&config.summarizer, Arc::clone(&estimator))?;

    Ok(RagProcessor::new(
        RetrievalEngine::new(index, config.retrieval.clone(), Arc::clone(&estimator)),
        ContextAssembler::new(config.assembler.clone(), Arc::clone(&estimator)),
        summarizer,
        Arc::new(ResponseCache::new(&config.cache)),
        estimator,
    ))
}

/// Full application state over the given index
pub fn build_state(
    config: &Config,
    index: Arc<dyn SemanticIndex>,
    estimator: Arc<dyn TokenEstimator>,
) -> Result<AppState> {
    let optimizer = build_optimizer(config, Arc::clone(&estimator))?;
    let processor = build_processor(config, index, estimator)?;
    Ok(AppState::new(Arc::new(optimizer), Arc::new(processor)))
}
