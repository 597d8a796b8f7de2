//! Error taxonomy shared by every component.
//!
//! # Propagation
//! ```text
//! Registry / Config Store  → surface errors to the calling instance
//! Service Instance         → applies fallback (stale data, bundled defaults)
//! Resilience engine        → absorbs Transient up to the retry budget, then Unavailable
//! Gateway                  → maps to HTTP status, never leaks raw errors
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Errors raised by the mesh components.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MeshError {
    /// Missing instance, config source or route.
    #[error("not found: {0}")]
    NotFound(String),

    /// No healthy instance, breaker open, bulkhead full or rate limited.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Network failure eligible for retry.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Deadline exceeded on an outbound call. Retryable like `Transient`.
    #[error("timed out: {0}")]
    TimedOut(String),

    /// The config server could not be reached. Callers fall back to defaults.
    #[error("config server unreachable: {0}")]
    ConfigUnreachable(String),

    /// Strict-mode registration conflict.
    #[error("instance {service}/{instance_id} already registered with different metadata")]
    DuplicateInstance { service: String, instance_id: String },

    /// Malformed input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Business-level failure reported by a peer. Never retried, never trips a breaker.
    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },
}

pub type Result<T> = std::result::Result<T, MeshError>;

impl MeshError {
    /// Whether the failure counts toward retry and circuit breaker statistics.
    pub fn is_transient(&self) -> bool {
        matches!(self, MeshError::Transient(_) | MeshError::TimedOut(_))
    }

    /// Short machine-readable kind, used in JSON bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            MeshError::NotFound(_) => "not_found",
            MeshError::Unavailable(_) => "unavailable",
            MeshError::Transient(_) => "transient",
            MeshError::TimedOut(_) => "timed_out",
            MeshError::ConfigUnreachable(_) => "config_unreachable",
            MeshError::DuplicateInstance { .. } => "duplicate_instance",
            MeshError::BadRequest(_) => "bad_request",
            MeshError::Upstream { .. } => "upstream",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            MeshError::NotFound(_) => StatusCode::NOT_FOUND,
            MeshError::Unavailable(_) | MeshError::ConfigUnreachable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            MeshError::Transient(_) => StatusCode::BAD_GATEWAY,
            MeshError::TimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
            MeshError::DuplicateInstance { .. } => StatusCode::CONFLICT,
            MeshError::BadRequest(_) => StatusCode::BAD_REQUEST,
            MeshError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
        }
    }
}

impl From<reqwest::Error> for MeshError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            MeshError::TimedOut(e.to_string())
        } else if e.is_decode() {
            MeshError::Upstream {
                status: 502,
                message: format!("invalid response body: {}", e),
            }
        } else {
            MeshError::Transient(e.to_string())
        }
    }
}

impl IntoResponse for MeshError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
