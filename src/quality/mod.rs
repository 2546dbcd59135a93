//! Quality impact estimation
//!
//! Prospective mode predicts degradation from (strategy, complexity) before a
//! budget is applied. Retrospective mode aggregates measured scores of
//! optimized runs against unconstrained baseline runs.

pub mod retrospective;

pub use retrospective::{
    aggregate_scenario, aggregate_strategy, summarize, AcceptanceThresholds, QualitySummary,
    RunSample, ScenarioAggregate, StrategyAggregate,
};

use serde::{Deserialize, Serialize};

use crate::context::models::{BudgetStrategy, ComplexityClass, Recommendation};

/// Coefficients of the prospective impact heuristic.
///
/// Predicted impact = strategy base impact × complexity multiplier, clamped
/// to [0, 1]. These are tuning parameters validated by the benchmark matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub conservative_impact: f64,
    pub balanced_impact: f64,
    pub aggressive_impact: f64,
    pub simple_multiplier: f64,
    pub moderate_multiplier: f64,
    pub complex_multiplier: f64,
    /// Above this the budget is applied but flagged for monitoring
    pub soft_threshold: f64,
    /// Above this optimization is skipped entirely
    pub hard_ceiling: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            conservative_impact: 0.01,
            balanced_impact: 0.025,
            aggressive_impact: 0.04,
            simple_multiplier: 1.0,
            moderate_multiplier: 1.6,
            complex_multiplier: 2.4,
            soft_threshold: 0.05,
            hard_ceiling: 0.25,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QualityImpactModel {
    config: QualityConfig,
}

impl QualityImpactModel {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    /// Monotonic in both aggressiveness and complexity, bounded to [0, 1]
    pub fn predict(&self, strategy: BudgetStrategy, complexity: ComplexityClass) -> f64 {
        let base = match strategy.resolve(complexity) {
            BudgetStrategy::Conservative => self.config.conservative_impact,
            BudgetStrategy::Aggressive => self.config.aggressive_impact,
            BudgetStrategy::Balanced | BudgetStrategy::Adaptive => self.config.balanced_impact,
        };
        let multiplier = match complexity {
            ComplexityClass::Simple => self.config.simple_multiplier,
            ComplexityClass::Moderate => self.config.moderate_multiplier,
            ComplexityClass::Complex => self.config.complex_multiplier,
        };
        let impact = base * multiplier;
        if impact.is_finite() {
            impact.clamp(0.0, 1.0)
        } else {
            1.0
        }
    }

    pub fn recommend(&self, quality_impact: f64) -> Recommendation {
        if quality_impact > self.config.hard_ceiling {
            Recommendation::Skip
        } else if quality_impact > self.config.soft_threshold {
            Recommendation::Reduce
        } else {
            Recommendation::Proceed
        }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }
}
