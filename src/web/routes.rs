use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::static_files::static_handler;
use super::state::AppState;

// UI Routes - web interface
pub fn ui_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::ui::index_handler))
        .route("/static/{*path}", get(static_handler))
}

// API Routes - REST API backing the dashboard views
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api",
        Router::new()
            // Query console
            .route("/query", post(handlers::api::run_query))
            .route("/refine", post(handlers::api::submit_refinement))
            .route("/refine/open", post(handlers::api::open_refinement))
            .route("/reset", post(handlers::api::reset_session))
            .route("/session", get(handlers::api::session_view))
            .route("/export", get(handlers::api::export_csv))

            // History view
            .route("/history", get(handlers::api::history))

            // Overview view
            .route("/overview", get(handlers::api::overview))

            // System status
            .route("/status", get(handlers::api::system_status)),
    )
}
