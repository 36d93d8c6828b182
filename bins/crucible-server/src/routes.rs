use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/compile", post(handlers::compile))
        .route("/api/health", get(handlers::health_check))
        .route("/metrics", get(handlers::export_metrics))
        .route("/api/review", post(handlers::review))
        .route("/api/analyze-errors", post(handlers::analyze_errors))
        .route("/api/autofix", post(handlers::autofix))
        .route("/api/generate", post(handlers::generate))
}
