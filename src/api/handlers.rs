//! HTTP handlers over the optimizer and RAG processor

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::models::{
    error_codes, failure, ApiError, ApiFailure, BudgetRequest, CacheClearResponse,
    ContextBuildRequest, ContextBuildResponse, HealthResponse, OutcomeRequest,
};
use crate::context::models::BudgetOptimizationResult;
use crate::context::optimizer::BudgetOptimizer;
use crate::metrics::METRICS;
use crate::rag::{ContextRequest, RagProcessor};
use crate::stats::{OptimizationStats, StatsReport};
use crate::toggles::{FeatureToggleUpdate, ToggleSnapshot};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub optimizer: Arc<BudgetOptimizer>,
    pub processor: Arc<RagProcessor>,
}

impl AppState {
    pub fn new(optimizer: Arc<BudgetOptimizer>, processor: Arc<RagProcessor>) -> Self {
        Self {
            optimizer,
            processor,
        }
    }
}

fn optimize(state: &AppState, request: &BudgetRequest) -> Result<BudgetOptimizationResult, ApiFailure> {
    let strategy = BudgetOptimizer::parse_strategy_override(request.strategy.as_deref()).map_err(failure)?;
    state
        .optimizer
        .calculate_optimal_budget(&request.query(), strategy)
        .map_err(failure)
}

/// Calculate the budget for a chat turn
///
/// POST /api/v1/budget
pub async fn calculate_budget(
    State(state): State<AppState>,
    Json(request): Json<BudgetRequest>,
) -> Result<Json<BudgetOptimizationResult>, ApiFailure> {
    let result = optimize(&state, &request)?;
    debug!(
        book_id = %request.book_id,
        strategy = %result.strategy_used,
        recommendation = result.recommendation.as_str(),
        "Budget calculated"
    );
    Ok(Json(result))
}

/// Budget, retrieve and assemble context for a chat turn.
///
/// When the client disconnects axum drops this future, which cancels the
/// in-flight retrieval and history summary with it.
///
/// POST /api/v1/context
pub async fn build_context(
    State(state): State<AppState>,
    Json(request): Json<ContextBuildRequest>,
) -> Result<Json<ContextBuildResponse>, ApiFailure> {
    let result = optimize(&state, &request.budget)?;

    // A skip means the caller gets the unconstrained baseline
    let budget = if result.recommendation.applies_budget() {
        result.budget
    } else {
        state.optimizer.engine().config().baseline_budget()
    };

    let context_request = ContextRequest::new(request.budget.query(), budget, result.strategy_used)
        .with_history(request.history);
    let built = state
        .processor
        .build_context(&context_request)
        .await
        .map_err(failure)?;

    if let Some(reason) = built.degraded {
        warn!(book_id = %request.budget.book_id, reason = %reason, "Serving degraded context");
    }

    Ok(Json(ContextBuildResponse {
        budget: result,
        context: built.context,
        cache_hit: built.cache_hit,
        degraded: built.degraded,
        fingerprint: built.fingerprint.to_string(),
    }))
}

/// GET /api/v1/toggles
pub async fn get_toggles(State(state): State<AppState>) -> Json<ToggleSnapshot> {
    Json(state.optimizer.feature_toggles().as_ref().clone())
}

/// PATCH /api/v1/toggles
pub async fn update_toggles(
    State(state): State<AppState>,
    Json(update): Json<FeatureToggleUpdate>,
) -> Json<ToggleSnapshot> {
    Json(state.optimizer.update_feature_toggles(&update).as_ref().clone())
}

/// Predicted stream at the top level, measured outcomes under `outcomes`
///
/// GET /api/v1/stats
pub async fn get_stats(State(state): State<AppState>) -> Json<StatsReport> {
    Json(state.optimizer.stats_report())
}

/// Record a retrospective quality score
///
/// POST /api/v1/stats/outcomes
pub async fn record_outcome(
    State(state): State<AppState>,
    Json(request): Json<OutcomeRequest>,
) -> Result<Json<OptimizationStats>, ApiFailure> {
    if !request.quality_score.is_finite() || !(0.0..=1.0).contains(&request.quality_score) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(
                error_codes::VALIDATION_ERROR,
                "quality_score must be between 0.0 and 1.0",
            )),
        ));
    }
    Ok(Json(state.optimizer.record_outcome(request.quality_score)))
}

/// DELETE /api/v1/cache
pub async fn clear_cache(State(state): State<AppState>) -> Json<CacheClearResponse> {
    let stats = state.processor.cache_stats();
    state.processor.clear_cache();
    info!(entries = stats.entry_count, "Cache cleared via API");
    Json(CacheClearResponse { cleared: true, stats })
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        toggles_version: state.optimizer.feature_toggles().version,
    })
}

/// GET /metrics
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.export_prometheus(),
    )
}
