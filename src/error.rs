//! Error types for the context budget engine

use thiserror::Error;

use crate::context::summarizer::SummarizerError;
use crate::context::token_budget::BudgetError;
use crate::retrieval::index::IndexError;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, ContextError>;

/// Errors surfaced by the budgeting and context assembly pipeline.
///
/// Degraded retrieval and budget overruns are not errors; they travel on the
/// successful result as explicit signals.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid strategy '{0}': expected one of conservative, balanced, aggressive, adaptive")]
    InvalidStrategy(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Summarization error: {0}")]
    Summarization(String),

    #[error("Request cancelled by client")]
    Cancelled,

    #[error("Report error: {0}")]
    Report(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ContextError {
    /// True for errors caused by caller input rather than the engine
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidStrategy(_))
    }
}

impl From<BudgetError> for ContextError {
    fn from(err: BudgetError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<IndexError> for ContextError {
    fn from(err: IndexError) -> Self {
        Self::Retrieval(err.to_string())
    }
}

impl From<SummarizerError> for ContextError {
    fn from(err: SummarizerError) -> Self {
        Self::Summarization(err.to_string())
    }
}

impl From<config::ConfigError> for ContextError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        assert!(ContextError::InvalidStrategy("turbo".into()).is_validation());
        assert!(ContextError::Validation("empty".into()).is_validation());
        assert!(!ContextError::Cancelled.is_validation());
    }

    #[test]
    fn test_budget_error_maps_to_configuration() {
        let err: ContextError = BudgetError::ConfigurationInvalid {
            allocated: 9000,
            max: 8000,
        }
        .into();
        assert!(matches!(err, ContextError::Configuration(_)));
    }
}
