//! Request identification and shared middleware.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) when the client sent none
//! - Propagate the ID to the response and to upstream calls
//! - Wrap every HTTP surface with the same trace and timeout layers
//!
//! # Design Decisions
//! - Request ID added as the outermost layer so traces carry it
//! - Incoming IDs are trusted and forwarded unchanged

use std::time::Duration;

use axum::http::{HeaderMap, HeaderName};
use axum::Router;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Read the request ID from headers, if any.
pub fn request_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(X_REQUEST_ID).and_then(|v| v.to_str().ok())
}

/// Apply request-id, trace and timeout layers to a router.
#[allow(deprecated)]
pub fn instrument(router: Router, request_timeout: Duration) -> Router {
    trace_requests(router.layer(TimeoutLayer::new(request_timeout)))
}

/// Request-id and trace layers only, for surfaces that enforce their own deadlines.
pub fn trace_requests(router: Router) -> Router {
    let header = HeaderName::from_static(X_REQUEST_ID);
    router
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(header.clone()))
        .layer(SetRequestIdLayer::new(header, MakeRequestUuid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, routing::get};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_request_id_generated_and_propagated() {
        let app = instrument(
            Router::new().route("/", get(|| async { "ok" })),
            Duration::from_secs(5),
        );

        let res = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let generated = request_id(res.headers()).unwrap();
        assert_eq!(generated.len(), 36);

        let res = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(X_REQUEST_ID, "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(request_id(res.headers()), Some("abc-123"));
    }
}
