//! Router construction

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{self, AppState};

/// Default request body ceiling
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the API router
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    let api_routes = Router::new()
        .route("/api/v1/budget", post(handlers::calculate_budget))
        .route("/api/v1/context", post(handlers::build_context))
        .route(
            "/api/v1/toggles",
            get(handlers::get_toggles).patch(handlers::update_toggles),
        )
        .route("/api/v1/stats", get(handlers::get_stats))
        .route("/api/v1/stats/outcomes", post(handlers::record_outcome))
        .route("/api/v1/cache", delete(handlers::clear_cache))
        .layer(RequestBodyLimitLayer::new(max_body_bytes));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .merge(api_routes)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
