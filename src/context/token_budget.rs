//! Per-strategy token allocation and budget computation
//!
//! The allocation table is the single tunable surface for the cost target:
//! - Baseline (unconstrained): 4,000 context + 1,000 response
//! - Conservative: 3,700 + 950 (~7% fewer tokens)
//! - Balanced: 3,200 + 850 (~19% fewer tokens)
//! - Aggressive: 2,600 + 700 (~34% fewer tokens)
//! - Model ceiling: 8,000 tokens

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::models::{Budget, BudgetOptimizationResult, BudgetStrategy, ComplexityClass, Query};
use super::token_estimator::TokenEstimator;
use crate::quality::QualityImpactModel;

/// Base allocation for one concrete strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyAllocation {
    pub context_tokens: usize,
    pub response_tokens: usize,
}

impl StrategyAllocation {
    pub const fn new(context_tokens: usize, response_tokens: usize) -> Self {
        Self {
            context_tokens,
            response_tokens,
        }
    }

    pub fn total(&self) -> usize {
        self.context_tokens + self.response_tokens
    }

    fn as_budget(&self) -> Budget {
        Budget::new(self.context_tokens, self.response_tokens)
    }
}

/// Token budget configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenBudgetConfig {
    /// Hard ceiling for context + response
    pub model_max_tokens: usize,
    /// Unconstrained allocation used when optimization is skipped or disabled
    pub baseline: StrategyAllocation,
    pub conservative: StrategyAllocation,
    pub balanced: StrategyAllocation,
    pub aggressive: StrategyAllocation,
    /// Context never drops below this while a budget is applied
    pub min_context_tokens: usize,
    /// Selections longer than this earn extra context
    pub long_selection_tokens: usize,
    pub max_selection_bonus: usize,
}

impl Default for TokenBudgetConfig {
    fn default() -> Self {
        Self {
            model_max_tokens: 8000,
            baseline: StrategyAllocation::new(4000, 1000),
            conservative: StrategyAllocation::new(3700, 950),
            balanced: StrategyAllocation::new(3200, 850),
            aggressive: StrategyAllocation::new(2600, 700),
            min_context_tokens: 512,
            long_selection_tokens: 128,
            max_selection_bonus: 512,
        }
    }
}

impl TokenBudgetConfig {
    /// Validate that the allocation table is consistent
    pub fn validate(&self) -> Result<(), BudgetError> {
        if self.baseline.total() > self.model_max_tokens {
            return Err(BudgetError::ConfigurationInvalid {
                allocated: self.baseline.total(),
                max: self.model_max_tokens,
            });
        }

        for allocation in [&self.conservative, &self.balanced, &self.aggressive] {
            let worst_case = allocation.total() + self.max_selection_bonus;
            if worst_case > self.model_max_tokens {
                return Err(BudgetError::ConfigurationInvalid {
                    allocated: worst_case,
                    max: self.model_max_tokens,
                });
            }
            if allocation.context_tokens < self.min_context_tokens {
                return Err(BudgetError::InsufficientBudget {
                    needed: self.min_context_tokens,
                    available: allocation.context_tokens,
                });
            }
        }

        if self.aggressive.context_tokens > self.balanced.context_tokens
            || self.balanced.context_tokens > self.conservative.context_tokens
        {
            return Err(BudgetError::NonMonotonic(
                "context allocation must satisfy aggressive <= balanced <= conservative".to_string(),
            ));
        }

        Ok(())
    }

    pub fn baseline_budget(&self) -> Budget {
        self.baseline.as_budget()
    }

    /// Base allocation after resolving `adaptive`
    pub fn allocation_for(&self, strategy: BudgetStrategy, complexity: ComplexityClass) -> StrategyAllocation {
        match strategy.resolve(complexity) {
            BudgetStrategy::Conservative => self.conservative,
            BudgetStrategy::Aggressive => self.aggressive,
            BudgetStrategy::Balanced | BudgetStrategy::Adaptive => self.balanced,
        }
    }
}

/// Token budget errors
#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("Configuration invalid: {allocated} tokens allocated, {max} tokens max")]
    ConfigurationInvalid { allocated: usize, max: usize },

    #[error("Insufficient budget: need {needed} tokens, have {available} tokens")]
    InsufficientBudget { needed: usize, available: usize },

    #[error("Allocation table not monotonic: {0}")]
    NonMonotonic(String),
}

/// Maps (query, complexity, strategy) to a budget and recommendation
pub struct BudgetStrategyEngine {
    config: TokenBudgetConfig,
    quality: QualityImpactModel,
    estimator: Arc<dyn TokenEstimator>,
}

impl BudgetStrategyEngine {
    pub fn new(
        config: TokenBudgetConfig,
        quality: QualityImpactModel,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Result<Self, BudgetError> {
        config.validate()?;
        Ok(Self {
            config,
            quality,
            estimator,
        })
    }

    /// Compute the budget for an already-resolved concrete strategy
    pub fn compute(
        &self,
        query: &Query,
        complexity: ComplexityClass,
        strategy: BudgetStrategy,
    ) -> BudgetOptimizationResult {
        let strategy = strategy.resolve(complexity);
        let base = self.config.allocation_for(strategy, complexity);

        let bonus = query
            .selection()
            .map(|s| self.selection_bonus(self.estimator.estimate(s)))
            .unwrap_or(0);

        let context_tokens = (base.context_tokens + bonus).max(self.config.min_context_tokens);
        let budget = Budget::new(context_tokens, base.response_tokens)
            .clamped(self.config.model_max_tokens);

        let quality_impact = self.quality.predict(strategy, complexity);
        let recommendation = self.quality.recommend(quality_impact);

        debug!(
            strategy = %strategy,
            complexity = %complexity,
            context_tokens = budget.context_tokens,
            response_tokens = budget.response_tokens,
            selection_bonus = bonus,
            quality_impact,
            recommendation = recommendation.as_str(),
            "Computed budget"
        );

        BudgetOptimizationResult {
            budget,
            recommendation,
            quality_impact,
            strategy_used: strategy,
            complexity,
        }
    }

    /// Extra context so a long selection can be kept verbatim
    fn selection_bonus(&self, selection_tokens: usize) -> usize {
        if selection_tokens <= self.config.long_selection_tokens {
            return 0;
        }
        (selection_tokens / 2).min(self.config.max_selection_bonus)
    }

    pub fn config(&self) -> &TokenBudgetConfig {
        &self.config
    }

    pub fn quality_model(&self) -> &QualityImpactModel {
        &self.quality
    }

    pub fn estimator(&self) -> &Arc<dyn TokenEstimator> {
        &self.estimator
    }
}
