//! HTTP API application wiring (Axum router).

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod errors;
pub mod handlers;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(state: Arc<AppState>, static_dir: &str) -> Router {
    let static_files = ServeDir::new(static_dir)
        .fallback(ServeFile::new(format!("{static_dir}/index.html")));

    Router::new()
        .route("/api/getStats", get(handlers::get_stats))
        .route("/api/flagSubmit", post(handlers::flag_submit))
        .with_state(state)
        .fallback_service(static_files)
        .layer(TraceLayer::new_for_http())
}
