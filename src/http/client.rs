//! Thin JSON API client shared by the registry and config clients.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::{MeshError, Result};

/// Base URL plus a configured `reqwest` client.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base: Url,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| MeshError::BadRequest(format!("invalid base URL '{}': {}", base_url, e)))?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base, http })
    }

    /// Base URL with `segments` appended, each percent-encoded.
    pub fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn base(&self) -> &Url {
        &self.base
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Translate a non-success response back into the error taxonomy.
pub async fn error_from_response(response: reqwest::Response) -> MeshError {
    let status = response.status();
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.message,
        Err(_) => status.canonical_reason().unwrap_or("unknown").to_string(),
    };
    match status.as_u16() {
        400 => MeshError::BadRequest(message),
        404 => MeshError::NotFound(message),
        502 => MeshError::Transient(message),
        503 => MeshError::Unavailable(message),
        504 => MeshError::TimedOut(message),
        status => MeshError::Upstream { status, message },
    }
}
