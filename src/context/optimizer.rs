//! Budget optimizer facade
//!
//! Entry point for the chat handler: classify, resolve the strategy under
//! the current toggle snapshot, compute the budget and record monitoring
//! data.

use std::sync::Arc;
use tracing::{info, instrument};

use super::classifier::ComplexityClassifier;
use super::models::{BudgetOptimizationResult, BudgetStrategy, ComplexityClass, Query, Recommendation};
use super::token_budget::BudgetStrategyEngine;
use crate::error::Result;
use crate::metrics::METRICS;
use crate::stats::{OptimizationStats, OptimizationStatsRecorder, StatsReport, MEASURED};
use crate::toggles::{FeatureToggleStore, FeatureToggleUpdate, FeatureToggles, ToggleSnapshot};

pub struct BudgetOptimizer {
    classifier: ComplexityClassifier,
    engine: BudgetStrategyEngine,
    toggles: Arc<FeatureToggleStore>,
    stats: Arc<OptimizationStatsRecorder>,
    outcomes: OptimizationStatsRecorder,
}

impl BudgetOptimizer {
    pub fn new(
        classifier: ComplexityClassifier,
        engine: BudgetStrategyEngine,
        toggles: Arc<FeatureToggleStore>,
        stats: Arc<OptimizationStatsRecorder>,
    ) -> Self {
        Self {
            classifier,
            engine,
            toggles,
            stats,
            outcomes: OptimizationStatsRecorder::for_source(MEASURED),
        }
    }

    /// Parse a caller-supplied strategy name; unknown names are rejected
    pub fn parse_strategy_override(raw: Option<&str>) -> Result<Option<BudgetStrategy>> {
        raw.map(str::parse).transpose()
    }

    #[instrument(skip(self, query), fields(book_id = %query.book_id))]
    pub fn calculate_optimal_budget(
        &self,
        query: &Query,
        strategy_override: Option<BudgetStrategy>,
    ) -> Result<BudgetOptimizationResult> {
        query.validate()?;

        let snapshot = self.toggles.read();
        let toggles = &snapshot.toggles;
        let complexity = self.classifier.classify(query);
        let strategy = Self::effective_strategy(strategy_override, complexity, toggles);

        let result = if toggles.enable_context_budget {
            self.engine.compute(query, complexity, strategy)
        } else {
            BudgetOptimizationResult {
                budget: self.engine.config().baseline_budget(),
                recommendation: Recommendation::Skip,
                quality_impact: 0.0,
                strategy_used: strategy,
                complexity,
            }
        };

        METRICS.record_budget(
            result.strategy_used.as_str(),
            result.recommendation.as_str(),
            result.budget.context_tokens,
            result.quality_impact,
        );

        if toggles.enable_quality_monitoring {
            self.stats.record(1.0 - result.quality_impact);
        }

        Ok(result)
    }

    /// Resolve to a concrete strategy. Automatic choices (the default
    /// strategy or adaptive resolution) may only land on aggressive while
    /// aggressive mode is enabled; an explicit aggressive override is kept.
    fn effective_strategy(
        strategy_override: Option<BudgetStrategy>,
        complexity: ComplexityClass,
        toggles: &FeatureToggles,
    ) -> BudgetStrategy {
        let requested = strategy_override.unwrap_or(toggles.default_strategy);
        let resolved = requested.resolve(complexity);

        let explicit_aggressive = strategy_override == Some(BudgetStrategy::Aggressive);
        if resolved == BudgetStrategy::Aggressive && !toggles.enable_aggressive_mode && !explicit_aggressive {
            BudgetStrategy::Balanced
        } else {
            resolved
        }
    }

    pub fn update_feature_toggles(&self, update: &FeatureToggleUpdate) -> Arc<ToggleSnapshot> {
        self.toggles.update(update)
    }

    pub fn feature_toggles(&self) -> Arc<ToggleSnapshot> {
        self.toggles.read()
    }

    /// Predicted stream: one entry per completed budget calculation
    pub fn get_optimization_stats(&self) -> OptimizationStats {
        self.stats.snapshot()
    }

    pub fn get_outcome_stats(&self) -> OptimizationStats {
        self.outcomes.snapshot()
    }

    pub fn stats_report(&self) -> StatsReport {
        StatsReport {
            predicted: self.stats.snapshot(),
            outcomes: self.outcomes.snapshot(),
        }
    }

    /// Record a retrospective quality score from the external scorer.
    /// Kept apart from the predicted stream so a scored turn is not
    /// counted twice.
    pub fn record_outcome(&self, quality_score: f64) -> OptimizationStats {
        let stats = self.outcomes.record(quality_score);
        info!(
            total_queries = stats.total_queries,
            avg_quality = stats.avg_quality,
            "Recorded quality outcome"
        );
        stats
    }

    pub fn engine(&self) -> &BudgetStrategyEngine {
        &self.engine
    }

    pub fn classifier(&self) -> &ComplexityClassifier {
        &self.classifier
    }
}
