//! HTTP API for budgeting and context assembly

pub mod handlers;
pub mod models;
pub mod routes;

pub use handlers::AppState;
pub use models::{error_codes, ApiError};
pub use routes::{build_router, DEFAULT_MAX_BODY_BYTES};
