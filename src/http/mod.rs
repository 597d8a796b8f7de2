//! HTTP plumbing shared by every component.
//!
//! # Data Flow
//! ```text
//! Incoming request
//!     → request.rs (request ID, trace span, timeout)
//!     → component router (registry / config / gateway / instance)
//!     → health.rs answers `GET /health` everywhere
//!
//! Outgoing call
//!     → client.rs (base URL + reqwest, error translation)
//! ```

pub mod client;
pub mod health;
pub mod request;

pub use client::ApiClient;
pub use health::{Health, HealthResponse};
pub use request::{instrument, request_id, trace_requests, X_REQUEST_ID};
