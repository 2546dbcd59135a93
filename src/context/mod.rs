//! Context budgeting and assembly
//!
//! Classifies each chat turn, turns (complexity, strategy, toggles) into a
//! token budget, and assembles a context that respects it.

pub mod assembler;
pub mod classifier;
pub mod models;
pub mod optimizer;
pub mod summarizer;
pub mod token_budget;
pub mod token_estimator;

pub use assembler::{AssemblerConfig, ContextAssembler};
pub use classifier::{ClassifierConfig, ComplexityClassifier};
pub use models::{
    AssembledContext, Budget, BudgetOptimizationResult, BudgetStrategy, ComplexityClass,
    ContextSection, Query, Recommendation, RetrievedChunk, SectionKind,
};
pub use optimizer::BudgetOptimizer;
pub use summarizer::{
    build_summarizer, FallbackSummarizer, LlmSummarizer, Summarizer, SummarizerConfig,
    SummarizerError, TruncatingSummarizer,
};
pub use token_budget::{BudgetError, BudgetStrategyEngine, StrategyAllocation, TokenBudgetConfig};
pub use token_estimator::{default_estimator, TiktokenEstimator, TokenEstimator, WordBasedEstimator};
