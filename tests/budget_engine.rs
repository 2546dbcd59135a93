//! Budget calculation through the public optimizer API

use std::sync::Arc;

use context_budget::app::build_optimizer;
use context_budget::benchmark::default_scenarios;
use context_budget::config::Config;
use context_budget::context::{
    BudgetOptimizer, BudgetStrategy, ComplexityClass, Query, Recommendation, WordBasedEstimator,
};
use context_budget::toggles::FeatureToggleUpdate;

fn optimizer() -> BudgetOptimizer {
    let mut config = Config::default();
    config.toggles.enable_aggressive_mode = true;
    build_optimizer(&config, Arc::new(WordBasedEstimator::default())).unwrap()
}

fn queries() -> Vec<Query> {
    default_scenarios().iter().map(|s| s.query()).collect()
}

#[test]
fn test_budget_never_exceeds_model_ceiling() {
    let optimizer = optimizer();
    let max = optimizer.engine().config().model_max_tokens;

    for query in queries() {
        for strategy in BudgetStrategy::ALL {
            let result = optimizer.calculate_optimal_budget(&query, Some(strategy)).unwrap();
            assert!(result.budget.total() <= max, "{:?} {:?}", query.text, strategy);
            assert!(result.budget.context_tokens > 0);
            assert!(result.budget.response_tokens > 0);
            assert_ne!(result.strategy_used, BudgetStrategy::Adaptive);
        }
    }
}

#[test]
fn test_more_aggressive_means_less_context_and_more_impact() {
    let optimizer = optimizer();

    for query in queries() {
        let results: Vec<_> = BudgetStrategy::CONCRETE
            .iter()
            .map(|&s| optimizer.calculate_optimal_budget(&query, Some(s)).unwrap())
            .collect();

        for pair in results.windows(2) {
            let (milder, harsher) = (&pair[0], &pair[1]);
            assert_eq!(milder.complexity, harsher.complexity);
            assert!(milder.budget.context_tokens >= harsher.budget.context_tokens);
            assert!(milder.quality_impact <= harsher.quality_impact);
        }
    }
}

#[test]
fn test_identical_inputs_identical_results() {
    let optimizer = optimizer();
    for query in queries() {
        for strategy in BudgetStrategy::ALL {
            let a = optimizer.calculate_optimal_budget(&query, Some(strategy)).unwrap();
            let b = optimizer.calculate_optimal_budget(&query, Some(strategy)).unwrap();
            assert_eq!(a, b);
            assert_eq!(a.quality_impact.to_bits(), b.quality_impact.to_bits());
        }
    }
}

#[test]
fn test_main_theme_conservative_vs_aggressive() {
    let optimizer = optimizer();
    let baseline = optimizer.engine().config().baseline_budget().total() as f64;
    let query = Query::new("What is the main theme?", "book-1");

    let conservative = optimizer
        .calculate_optimal_budget(&query, Some(BudgetStrategy::Conservative))
        .unwrap();
    let reduction = 1.0 - conservative.budget.total() as f64 / baseline;
    assert!(reduction > 0.0 && reduction < 0.10, "reduction {}", reduction);
    assert!(conservative.quality_impact <= 0.02);
    assert_eq!(conservative.recommendation, Recommendation::Proceed);

    let aggressive = optimizer
        .calculate_optimal_budget(&query, Some(BudgetStrategy::Aggressive))
        .unwrap();
    let reduction = 1.0 - aggressive.budget.total() as f64 / baseline;
    assert!(reduction >= 0.25, "reduction {}", reduction);
    assert!(aggressive.quality_impact <= 0.05);
}

#[test]
fn test_complex_queries_predict_higher_impact() {
    let optimizer = optimizer();
    let simple = Query::new("What is the main theme?", "book-1");
    let complex = default_scenarios()
        .into_iter()
        .find(|s| s.name == "weather_imagery")
        .unwrap()
        .query();

    let simple = optimizer
        .calculate_optimal_budget(&simple, Some(BudgetStrategy::Balanced))
        .unwrap();
    let complex = optimizer
        .calculate_optimal_budget(&complex, Some(BudgetStrategy::Balanced))
        .unwrap();

    assert_eq!(simple.complexity, ComplexityClass::Simple);
    assert_eq!(complex.complexity, ComplexityClass::Complex);
    assert!(complex.quality_impact > simple.quality_impact);
}

#[test]
fn test_unknown_strategy_name_is_rejected() {
    let err = BudgetOptimizer::parse_strategy_override(Some("turbo")).unwrap_err();
    assert!(err.is_validation());
    assert_eq!(
        BudgetOptimizer::parse_strategy_override(Some("Adaptive")).unwrap(),
        Some(BudgetStrategy::Adaptive)
    );
    assert_eq!(BudgetOptimizer::parse_strategy_override(None).unwrap(), None);
}

#[test]
fn test_toggle_stores_are_isolated_per_optimizer() {
    let first = optimizer();
    let second = optimizer();

    first.update_feature_toggles(&FeatureToggleUpdate {
        enable_context_budget: Some(false),
        ..Default::default()
    });

    let query = Query::new("What is the main theme?", "book-1");
    let skipped = first.calculate_optimal_budget(&query, None).unwrap();
    assert_eq!(skipped.recommendation, Recommendation::Skip);
    assert_eq!(skipped.budget, first.engine().config().baseline_budget());

    let applied = second.calculate_optimal_budget(&query, None).unwrap();
    assert_ne!(applied.recommendation, Recommendation::Skip);
}
