//! Error types for the Observer API server.
//!
//! [`ObserverError`] converts into an Axum response with a JSON body of
//! the form `{"error": "...", "status": 400}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use threadpulse_core::ServiceError;

/// Errors that can occur in the Observer API layer.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The service rejected the request.
    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    /// A serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The service has been shut down.
    #[error("service closed")]
    Closed,
}

impl ObserverError {
    /// HTTP status this error maps to.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Service(ServiceError::InvalidRequest { .. }) => StatusCode::BAD_REQUEST,
            Self::Closed => StatusCode::SERVICE_UNAVAILABLE,
            Self::Service(_) | Self::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_request_is_a_client_error() {
        let err = ObserverError::from(ServiceError::InvalidRequest {
            reason: String::from("missing"),
        });
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn closed_service_is_unavailable() {
        assert_eq!(
            ObserverError::Closed.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn runtime_errors_are_server_errors() {
        assert_eq!(
            ObserverError::Service(ServiceError::NoRuntime).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
