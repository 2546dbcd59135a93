//! Retrospective quality and cost aggregation
//!
//! Scores come from an external scorer; this module only defines how they
//! roll up: per-scenario averages across repeated runs, per-strategy averages
//! across scenarios, then an overall summary checked against the acceptance
//! bounds.

use serde::{Deserialize, Serialize};

use crate::context::models::BudgetStrategy;

/// Paired baseline/optimized measurements for one run of one scenario
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunSample {
    pub baseline_tokens: usize,
    pub optimized_tokens: usize,
    pub baseline_quality: f64,
    pub optimized_quality: f64,
    pub baseline_latency_ms: f64,
    pub optimized_latency_ms: f64,
}

/// Averages for one (scenario, strategy) cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioAggregate {
    pub scenario: String,
    pub strategy: BudgetStrategy,
    pub runs: usize,
    pub avg_baseline_tokens: f64,
    pub avg_optimized_tokens: f64,
    pub avg_baseline_quality: f64,
    pub avg_optimized_quality: f64,
    pub avg_baseline_latency_ms: f64,
    pub avg_optimized_latency_ms: f64,
    pub token_reduction_pct: f64,
    pub quality_impact_pct: f64,
    pub latency_change_pct: f64,
}

/// Averages for one strategy across scenarios
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyAggregate {
    pub strategy: BudgetStrategy,
    pub scenarios: usize,
    pub token_reduction_pct: f64,
    pub quality_impact_pct: f64,
    pub latency_change_pct: f64,
}

/// Acceptance bounds for rollout
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceThresholds {
    pub min_token_reduction_pct: f64,
    pub max_quality_impact_pct: f64,
    pub max_latency_change_pct: f64,
}

impl Default for AcceptanceThresholds {
    fn default() -> Self {
        Self {
            min_token_reduction_pct: 15.0,
            max_quality_impact_pct: 5.0,
            max_latency_change_pct: 10.0,
        }
    }
}

/// Overall verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySummary {
    pub token_reduction_pct: f64,
    pub quality_impact_pct: f64,
    pub latency_change_pct: f64,
    pub token_reduction_passed: bool,
    pub quality_impact_passed: bool,
    pub latency_change_passed: bool,
    pub passed: bool,
    pub thresholds: AcceptanceThresholds,
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Relative change of `value` against `baseline`, in percent
fn pct_change(baseline: f64, value: f64) -> f64 {
    if baseline.abs() < f64::EPSILON {
        0.0
    } else {
        (value - baseline) / baseline * 100.0
    }
}

pub fn aggregate_scenario(
    scenario: &str,
    strategy: BudgetStrategy,
    samples: &[RunSample],
) -> ScenarioAggregate {
    let avg_baseline_tokens = mean(samples.iter().map(|s| s.baseline_tokens as f64));
    let avg_optimized_tokens = mean(samples.iter().map(|s| s.optimized_tokens as f64));
    let avg_baseline_quality = mean(samples.iter().map(|s| s.baseline_quality));
    let avg_optimized_quality = mean(samples.iter().map(|s| s.optimized_quality));
    let avg_baseline_latency_ms = mean(samples.iter().map(|s| s.baseline_latency_ms));
    let avg_optimized_latency_ms = mean(samples.iter().map(|s| s.optimized_latency_ms));

    ScenarioAggregate {
        scenario: scenario.to_string(),
        strategy,
        runs: samples.len(),
        avg_baseline_tokens,
        avg_optimized_tokens,
        avg_baseline_quality,
        avg_optimized_quality,
        avg_baseline_latency_ms,
        avg_optimized_latency_ms,
        token_reduction_pct: -pct_change(avg_baseline_tokens, avg_optimized_tokens),
        quality_impact_pct: -pct_change(avg_baseline_quality, avg_optimized_quality),
        latency_change_pct: pct_change(avg_baseline_latency_ms, avg_optimized_latency_ms),
    }
}

pub fn aggregate_strategy(strategy: BudgetStrategy, cells: &[ScenarioAggregate]) -> StrategyAggregate {
    let cells: Vec<&ScenarioAggregate> = cells.iter().filter(|c| c.strategy == strategy).collect();
    StrategyAggregate {
        strategy,
        scenarios: cells.len(),
        token_reduction_pct: mean(cells.iter().map(|c| c.token_reduction_pct)),
        quality_impact_pct: mean(cells.iter().map(|c| c.quality_impact_pct)),
        latency_change_pct: mean(cells.iter().map(|c| c.latency_change_pct)),
    }
}

pub fn summarize(strategies: &[StrategyAggregate], thresholds: AcceptanceThresholds) -> QualitySummary {
    let token_reduction_pct = mean(strategies.iter().map(|s| s.token_reduction_pct));
    let quality_impact_pct = mean(strategies.iter().map(|s| s.quality_impact_pct));
    let latency_change_pct = mean(strategies.iter().map(|s| s.latency_change_pct));

    let token_reduction_passed = token_reduction_pct >= thresholds.min_token_reduction_pct;
    let quality_impact_passed = quality_impact_pct.abs() <= thresholds.max_quality_impact_pct;
    let latency_change_passed = latency_change_pct.abs() <= thresholds.max_latency_change_pct;

    QualitySummary {
        token_reduction_pct,
        quality_impact_pct,
        latency_change_pct,
        token_reduction_passed,
        quality_impact_passed,
        latency_change_passed,
        passed: token_reduction_passed && quality_impact_passed && latency_change_passed,
        thresholds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(optimized_tokens: usize, optimized_quality: f64, optimized_latency_ms: f64) -> RunSample {
        RunSample {
            baseline_tokens: 1000,
            optimized_tokens,
            baseline_quality: 0.8,
            optimized_quality,
            baseline_latency_ms: 1000.0,
            optimized_latency_ms,
        }
    }

    #[test]
    fn test_scenario_averages_across_runs() {
        let samples = [sample(700, 0.78, 950.0), sample(900, 0.74, 1050.0)];
        let cell = aggregate_scenario("theme", BudgetStrategy::Balanced, &samples);

        assert_eq!(cell.runs, 2);
        assert!((cell.avg_optimized_tokens - 800.0).abs() < 1e-9);
        assert!((cell.token_reduction_pct - 20.0).abs() < 1e-9);
        assert!((cell.quality_impact_pct - 5.0).abs() < 1e-9);
        assert!(cell.latency_change_pct.abs() < 1e-9);
    }

    #[test]
    fn test_strategy_aggregate_filters_by_strategy() {
        let cells = vec![
            aggregate_scenario("a", BudgetStrategy::Aggressive, &[sample(600, 0.8, 1000.0)]),
            aggregate_scenario("b", BudgetStrategy::Aggressive, &[sample(800, 0.8, 1000.0)]),
            aggregate_scenario("a", BudgetStrategy::Conservative, &[sample(1000, 0.8, 1000.0)]),
        ];
        let aggressive = aggregate_strategy(BudgetStrategy::Aggressive, &cells);
        assert_eq!(aggressive.scenarios, 2);
        assert!((aggressive.token_reduction_pct - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_verdict() {
        let passing = StrategyAggregate {
            strategy: BudgetStrategy::Balanced,
            scenarios: 1,
            token_reduction_pct: 20.0,
            quality_impact_pct: 3.0,
            latency_change_pct: -4.0,
        };
        let summary = summarize(&[passing.clone()], AcceptanceThresholds::default());
        assert!(summary.passed);

        let slow = StrategyAggregate {
            latency_change_pct: 12.0,
            ..passing
        };
        let summary = summarize(&[slow], AcceptanceThresholds::default());
        assert!(summary.token_reduction_passed);
        assert!(!summary.latency_change_passed);
        assert!(!summary.passed);
    }

    #[test]
    fn test_empty_inputs_do_not_divide_by_zero() {
        let cell = aggregate_scenario("empty", BudgetStrategy::Balanced, &[]);
        assert_eq!(cell.runs, 0);
        assert_eq!(cell.token_reduction_pct, 0.0);
        let summary = summarize(&[], AcceptanceThresholds::default());
        assert!(!summary.token_reduction_passed);
    }
}
