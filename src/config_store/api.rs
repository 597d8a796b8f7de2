//! Config server HTTP API.
//!
//! ```text
//! GET /{application}/{profile}   merged document      → 200 | 404
//! GET /{application}             default profile      → 200 | 404
//! PUT /{application}/{profile}   commit JSON object   → 200 {version}
//! ```

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::config_store::repository::{ConfigDocument, ConfigRepository};
use crate::config_store::source::Properties;
use crate::error::Result;
use crate::http::Health;

/// Response to a commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitResponse {
    pub version: u64,
}

/// Build the config server router.
pub fn router(repository: Arc<ConfigRepository>, health: Health) -> Router {
    Router::new()
        .route("/{application}", get(fetch_default))
        .route("/{application}/{profile}", get(fetch).put(commit))
        .with_state(repository)
        .merge(health.router())
}

async fn fetch(
    State(repository): State<Arc<ConfigRepository>>,
    Path((application, profile)): Path<(String, String)>,
) -> Result<Json<ConfigDocument>> {
    Ok(Json(repository.fetch(&application, &profile)?))
}

async fn fetch_default(
    State(repository): State<Arc<ConfigRepository>>,
    Path(application): Path<String>,
) -> Result<Json<ConfigDocument>> {
    Ok(Json(repository.fetch(&application, "default")?))
}

async fn commit(
    State(repository): State<Arc<ConfigRepository>>,
    Path((application, profile)): Path<(String, String)>,
    Json(properties): Json<Properties>,
) -> Json<CommitResponse> {
    let version = repository.commit(&application, &profile, properties);
    Json(CommitResponse { version })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::{Request, StatusCode}};
    use serde_json::json;
    use tower::ServiceExt;

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_commit_then_fetch() {
        let repository = Arc::new(ConfigRepository::new());
        let app = router(repository, Health::new());

        let res = app.clone().oneshot(get_request("/limits/default")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/limits/default")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"minimum": 3, "maximum": 997}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let res = app.clone().oneshot(get_request("/limits")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(res.into_body(), 64 * 1024).await.unwrap();
        let doc: ConfigDocument = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc.properties["maximum"], json!(997));
        assert_eq!(doc.version, 1);

        let res = app.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
