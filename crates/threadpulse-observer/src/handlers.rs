//! REST endpoint handlers for the Observer server.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/active-thread-count` | Sample the active thread histogram once |
//! | `GET` | `/health` | Subscriber count and broadcast status |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use threadpulse_types::{ActiveThreadCountRequest, ActiveThreadCountResponse};

use crate::error::ObserverError;
use crate::state::AppState;

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    /// `ok` while the service accepts streams, `closed` after shutdown.
    pub status: String,
    /// Channels currently receiving broadcasts.
    pub subscribers: usize,
    /// Whether the broadcast task is running.
    pub broadcasting: bool,
}

/// Sample current activity and return it as JSON.
pub async fn active_thread_count(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ActiveThreadCountResponse>, ObserverError> {
    if state.service.is_closed() {
        return Err(ObserverError::Closed);
    }
    let response = state.service.query(Some(&ActiveThreadCountRequest))?;
    Ok(Json(response))
}

/// Report liveness plus stream introspection.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let service = &state.service;
    let status = if service.is_closed() { "closed" } else { "ok" };
    Json(HealthResponse {
        status: status.to_owned(),
        subscribers: service.subscriber_count(),
        broadcasting: service.is_broadcasting(),
    })
}
