//! Outbound calls from one service to another.
//!
//! # Data Flow
//! ```text
//! call(service, policy, request)
//!     → engine policy (rate limit, bulkhead, retries, breaker, timeout)
//!         → per attempt: discovery lookup → round-robin → HTTP request
//!         → 2xx: response
//!         → 502/503/504, connect failure, timeout: Transient / TimedOut
//!         → any other status: Upstream (business error, not retried)
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{MeshError, Result};
use crate::load_balancer::BalancerPool;
use crate::registry::{Discovery, Instance};
use crate::resilience::retries::{is_retryable_method, is_transient_status};
use crate::resilience::ResilienceEngine;

/// Request to send to whichever instance gets picked.
#[derive(Debug, Clone)]
pub struct PeerRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Bytes>,
}

impl PeerRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    pub fn post_json<T: Serialize>(path: impl Into<String>, body: &T) -> Result<Self> {
        let body = serde_json::to_vec(body).map_err(|e| MeshError::BadRequest(e.to_string()))?;
        Ok(Self {
            method: Method::POST,
            path: path.into(),
            body: Some(Bytes::from(body)),
        })
    }
}

/// Successful peer answer.
#[derive(Debug, Clone)]
pub struct PeerResponse {
    pub status: u16,
    /// Instance that produced the answer.
    pub instance_id: String,
    pub body: Bytes,
}

impl PeerResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| MeshError::Upstream {
            status: 502,
            message: format!("invalid response from {}: {}", self.instance_id, e),
        })
    }
}

/// Registry-aware, policy-wrapped HTTP client.
pub struct PeerClient {
    discovery: Arc<dyn Discovery>,
    engine: Arc<ResilienceEngine>,
    balancers: BalancerPool,
    http: reqwest::Client,
}

impl PeerClient {
    pub fn new(
        discovery: Arc<dyn Discovery>,
        engine: Arc<ResilienceEngine>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| MeshError::BadRequest(format!("http client: {}", e)))?;
        Ok(Self {
            discovery,
            engine,
            balancers: BalancerPool::new(),
            http,
        })
    }

    /// Call `service` under the policy named `policy`.
    ///
    /// Non-idempotent methods get a single attempt.
    pub async fn call(&self, service: &str, policy: &str, request: PeerRequest) -> Result<PeerResponse> {
        let service = service.to_lowercase();
        let policy = self.engine.policy(policy);
        let op = || self.attempt(&service, &request);
        if is_retryable_method(&request.method) {
            policy.call(op).await
        } else {
            policy.call_once(op).await
        }
    }

    /// `GET path` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, service: &str, policy: &str, path: &str) -> Result<T> {
        self.call(service, policy, PeerRequest::get(path)).await?.json()
    }

    async fn attempt(&self, service: &str, request: &PeerRequest) -> Result<PeerResponse> {
        let instances = self
            .discovery
            .lookup(service)
            .await
            .map_err(|e| MeshError::Unavailable(format!("cannot resolve '{}': {}", service, e)))?;
        let instance = self
            .balancers
            .select(service, &instances)
            .ok_or_else(|| MeshError::Unavailable(format!("no available instance of '{}'", service)))?;

        let url = format!("http://{}{}", instance.address(), request.path);
        let mut builder = self.http.request(request.method.clone(), &url);
        if let Some(body) = &request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        tracing::debug!(
            service = %service,
            instance = %instance.instance_id,
            url = %url,
            "Calling peer"
        );
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                if e.is_connect() {
                    self.discovery.invalidate(service);
                }
                return Err(attribute(&instance, e.into()));
            }
        };
        let status = response.status();
        let body = response.bytes().await.map_err(|e| attribute(&instance, e.into()))?;

        if status.is_success() {
            return Ok(PeerResponse {
                status: status.as_u16(),
                instance_id: instance.instance_id,
                body,
            });
        }
        let message = String::from_utf8_lossy(&body).into_owned();
        if is_transient_status(status) {
            Err(MeshError::Transient(format!(
                "{} answered {}: {}",
                instance.instance_id, status, message
            )))
        } else {
            Err(MeshError::Upstream {
                status: status.as_u16(),
                message,
            })
        }
    }
}

fn attribute(instance: &Instance, error: MeshError) -> MeshError {
    match error {
        MeshError::Transient(m) => {
            MeshError::Transient(format!("{} ({}): {}", instance.instance_id, instance.address(), m))
        }
        MeshError::TimedOut(m) => {
            MeshError::TimedOut(format!("{} ({}): {}", instance.instance_id, instance.address(), m))
        }
        other => other,
    }
}
