//! Context budget engine for book chat
//!
//! Decides how many tokens a chat turn may spend on retrieved context and on
//! the answer, retrieves and packs passages into that budget, and reports
//! how budgeting strategies trade tokens against answer quality.

pub mod api;
pub mod app;
pub mod benchmark;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod quality;
pub mod rag;
pub mod retrieval;
pub mod stats;
pub mod toggles;

pub use error::{ContextError, Result};

pub mod prelude {
    pub use crate::config::Config;
    pub use crate::context::{
        AssembledContext, Budget, BudgetOptimizationResult, BudgetOptimizer, BudgetStrategy,
        ComplexityClass, Query, Recommendation, TokenEstimator,
    };
    pub use crate::error::{ContextError, Result};
    pub use crate::rag::{BuiltContext, ContextRequest, RagProcessor};
    pub use crate::retrieval::{DegradedReason, SemanticIndex};
    pub use crate::toggles::{FeatureToggleStore, FeatureToggleUpdate, FeatureToggles};
}
