//! Request and response bodies for the HTTP API

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;
use crate::context::models::{AssembledContext, BudgetOptimizationResult, Query};
use crate::error::ContextError;
use crate::retrieval::DegradedReason;

/// Error codes returned in [`ApiError::code`]
pub mod error_codes {
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const INVALID_STRATEGY: &str = "INVALID_STRATEGY";
    pub const CANCELLED: &str = "CANCELLED";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// JSON error body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

pub type ApiFailure = (StatusCode, Json<ApiError>);

impl From<ContextError> for ApiError {
    fn from(err: ContextError) -> Self {
        let code = match &err {
            ContextError::Validation(_) => error_codes::VALIDATION_ERROR,
            ContextError::InvalidStrategy(_) => error_codes::INVALID_STRATEGY,
            ContextError::Cancelled => error_codes::CANCELLED,
            _ => error_codes::INTERNAL_ERROR,
        };
        Self::new(code, err.to_string())
    }
}

/// Map an engine error onto a status code and JSON body
pub fn failure(err: ContextError) -> ApiFailure {
    let status = match &err {
        e if e.is_validation() => StatusCode::BAD_REQUEST,
        ContextError::Cancelled => StatusCode::REQUEST_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiError::from(err)))
}

/// POST /api/v1/budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetRequest {
    pub message: String,
    pub book_id: String,
    #[serde(default)]
    pub chapter_idx: Option<u32>,
    #[serde(default)]
    pub selection: Option<String>,
    /// Strategy name; validated, never coerced
    #[serde(default)]
    pub strategy: Option<String>,
}

impl BudgetRequest {
    pub fn query(&self) -> Query {
        let mut query = Query::new(self.message.clone(), self.book_id.clone());
        if let Some(selection) = &self.selection {
            query = query.with_selection(selection.clone());
        }
        if let Some(chapter_idx) = self.chapter_idx {
            query = query.with_chapter(chapter_idx);
        }
        query
    }
}

/// POST /api/v1/context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBuildRequest {
    #[serde(flatten)]
    pub budget: BudgetRequest,
    /// Prior conversation turns, oldest first
    #[serde(default)]
    pub history: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBuildResponse {
    pub budget: BudgetOptimizationResult,
    pub context: AssembledContext,
    pub cache_hit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<DegradedReason>,
    pub fingerprint: String,
}

/// POST /api/v1/stats/outcomes
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OutcomeRequest {
    pub quality_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheClearResponse {
    pub cleared: bool,
    /// Counters as they were just before the clear
    pub stats: CacheStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub toggles_version: u64,
}
