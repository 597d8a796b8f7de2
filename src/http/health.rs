//! `GET /health` shared by every component.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

/// Health endpoint body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Shared UP/DOWN flag.
#[derive(Debug, Clone)]
pub struct Health {
    up: Arc<AtomicBool>,
}

impl Health {
    pub fn new() -> Self {
        Self {
            up: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::Relaxed)
    }

    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::Relaxed);
    }

    /// Router serving `/health` from this flag.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .with_state(self.clone())
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new()
    }
}

async fn health_handler(State(health): State<Health>) -> (StatusCode, Json<HealthResponse>) {
    if health.is_up() {
        (StatusCode::OK, Json(HealthResponse { status: "UP".into() }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse { status: "DOWN".into() }),
        )
    }
}
