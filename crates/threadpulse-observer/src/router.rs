//! Axum router construction for the Observer API.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router for the Observer server.
///
/// - `GET /health` -- liveness and stream status
/// - `GET /api/active-thread-count` -- one-off sample
/// - `GET /ws/active-thread-count` -- `WebSocket` broadcast stream
///
/// CORS allows any origin so dashboards served elsewhere can connect.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/active-thread-count", get(handlers::active_thread_count))
        .route("/ws/active-thread-count", get(ws::ws_active_thread_count))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
