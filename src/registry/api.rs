//! Registry HTTP API.
//!
//! ```text
//! POST   /instances/{service}/{id}   register (body: host, port, status?) → 201 Lease
//! PUT    /instances/{service}/{id}   heartbeat (optional body: status)    → 200 | 404
//! DELETE /instances/{service}/{id}   deregister                            → 204 | 404
//! GET    /instances/{service}        lookup UP instances                   → 200 [Instance]
//! GET    /instances                  list services                         → 200 [ServiceSummary]
//! ```

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::error::{MeshError, Result};
use crate::http::Health;
use crate::registry::instance::{HeartbeatRequest, Instance, Lease, RegisterRequest, ServiceSummary};
use crate::registry::store::Registry;

/// Build the registry router.
pub fn router(registry: Arc<Registry>, health: Health) -> Router {
    Router::new()
        .route("/instances", get(list_services))
        .route("/instances/{service}", get(lookup))
        .route(
            "/instances/{service}/{instance_id}",
            post(register).put(heartbeat).delete(deregister),
        )
        .with_state(registry)
        .merge(health.router())
}

async fn register(
    State(registry): State<Arc<Registry>>,
    Path((service, instance_id)): Path<(String, String)>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Lease>)> {
    if req.host.trim().is_empty() {
        return Err(MeshError::BadRequest("host must not be empty".into()));
    }
    let instance = Instance::new(service, instance_id, req.host, req.port)
        .with_status(req.status.unwrap_or_default());
    let lease = registry.register(instance)?;
    Ok((StatusCode::CREATED, Json(lease)))
}

async fn heartbeat(
    State(registry): State<Arc<Registry>>,
    Path((service, instance_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<StatusCode> {
    let req: HeartbeatRequest = if body.is_empty() {
        HeartbeatRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| MeshError::BadRequest(format!("invalid heartbeat body: {}", e)))?
    };
    registry.heartbeat(&service, &instance_id, req.status)?;
    Ok(StatusCode::OK)
}

async fn deregister(
    State(registry): State<Arc<Registry>>,
    Path((service, instance_id)): Path<(String, String)>,
) -> Result<StatusCode> {
    registry.deregister(&service, &instance_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn lookup(
    State(registry): State<Arc<Registry>>,
    Path(service): Path<String>,
) -> Json<Vec<Instance>> {
    Json(registry.lookup(&service))
}

async fn list_services(State(registry): State<Arc<Registry>>) -> Json<Vec<ServiceSummary>> {
    Json(registry.services())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RegistryConfig;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    fn app(strict: bool) -> (Router, Arc<Registry>) {
        let registry = Arc::new(Registry::new(RegistryConfig {
            strict,
            ..Default::default()
        }));
        (router(registry.clone(), Health::new()), registry)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(res: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(res.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_register_lookup_deregister_over_http() {
        let (app, _) = app(false);

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/instances/exchange/A",
                serde_json::json!({"host": "h1", "port": 8000}),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let lease: Lease = body_json(res).await;
        assert_eq!(lease.instance_id, "A");

        let res = app.clone().oneshot(empty_request("GET", "/instances/exchange")).await.unwrap();
        let instances: Vec<Instance> = body_json(res).await;
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].host, "h1");

        let res = app
            .clone()
            .oneshot(empty_request("DELETE", "/instances/exchange/A"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);

        let res = app.oneshot(empty_request("GET", "/instances/exchange")).await.unwrap();
        let instances: Vec<Instance> = body_json(res).await;
        assert!(instances.is_empty());
    }

    #[tokio::test]
    async fn test_heartbeat_with_and_without_body() {
        let (app, registry) = app(false);
        registry.register(Instance::new("exchange", "A", "h1", 8000)).unwrap();

        let res = app
            .clone()
            .oneshot(empty_request("PUT", "/instances/exchange/A"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let res = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/instances/exchange/A",
                serde_json::json!({"status": "OUT_OF_SERVICE"}),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(registry.lookup("exchange").is_empty());

        let res = app.oneshot(empty_request("PUT", "/instances/exchange/B")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_strict_conflict_is_409() {
        let (app, registry) = app(true);
        registry.register(Instance::new("exchange", "A", "h1", 8000)).unwrap();

        let res = app
            .oneshot(json_request(
                "POST",
                "/instances/exchange/A",
                serde_json::json!({"host": "h9", "port": 8000}),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_list_services_and_health() {
        let (app, registry) = app(false);
        registry.register(Instance::new("exchange", "A", "h1", 8000)).unwrap();
        registry.register(Instance::new("limits", "L", "h2", 8080)).unwrap();

        let res = app.clone().oneshot(empty_request("GET", "/instances")).await.unwrap();
        let services: Vec<ServiceSummary> = body_json(res).await;
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].name, "exchange");

        let res = app.oneshot(empty_request("GET", "/health")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
