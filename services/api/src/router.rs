//! Axum Router Configuration
//!
//! HTTP routes for meeting control, the platform webhook and the UI socket,
//! with the static UI pages served as the fallback.

use crate::{handlers, state::AppState, ws::ws_handler};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::services::ServeDir;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let static_dir = app_state.config.static_dir.clone();

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/start", post(handlers::start_meeting))
        .route("/add_bots", post(handlers::add_bot))
        .route("/remove_bot", post(handlers::remove_bot))
        .route("/api/webhook/recall", post(handlers::recall_webhook))
        .route("/personas", get(handlers::list_personas))
        .with_state(app_state)
        .fallback_service(ServeDir::new(static_dir).append_index_html_on_directories(true))
}
