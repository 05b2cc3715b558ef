use crate::handlers;
use crate::AppState;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use codejudge_engine::runner::{MAX_SOURCE_CODE_BYTES, MAX_STDIN_BYTES};
use std::sync::Arc;

/// Room for the largest accepted source and stdin, JSON-escaped.
/// Anything under this reaches the engine's own size checks.
pub const MAX_BODY_BYTES: usize = 2 * (MAX_SOURCE_CODE_BYTES + MAX_STDIN_BYTES);

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/run", post(handlers::run_code))
        .route("/submit", post(handlers::submit_code))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}
