//! HTTP router construction.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api;
use crate::state::AppState;

/// Build the application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let max_body = state.config.server.max_upload_mb as usize * 1024 * 1024;

    Router::new()
        .route("/health", get(api::health))
        .route("/config", get(api::config_summary))
        .route(
            "/summarize",
            post(api::summarize_upload).layer(DefaultBodyLimit::max(max_body)),
        )
        .route("/summarize/text", post(api::summarize_text))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
