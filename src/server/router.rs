use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::state::AppState;

/// Creates the application router.
///
/// - `/` and `/static/*`: web UI from `STATIC_DIR`
/// - `/api/*`: chat, suggestions, status, manual update
pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = state.settings.static_dir.clone();
    let cors_layer = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat", post(handlers::chat))
        .route("/api/suggestions", get(handlers::suggestions))
        .route("/api/status", get(handlers::status))
        .route("/api/update", post(handlers::trigger_update))
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .nest_service("/static", ServeDir::new(static_dir))
        .with_state(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}
