//! Gateway HTTP server.
//!
//! # Responsibilities
//! - Serve `/health` and send every other request through the proxy handler
//! - Match routes, resolve the target service, pick an instance
//! - Forward through the route's resilience policy, if it names one
//! - Log and count every proxied request
//!
//! # Design Decisions
//! - Bodies are buffered (up to `max_body_size`) so an attempt can be replayed
//! - Instances are re-resolved and re-balanced on every attempt
//! - Non-idempotent methods are never retried
//! - Upstream 502/503/504 are failures only when a policy is in force;
//!   without one the upstream's response is passed through

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use hyper::body::Incoming;
use hyper_util::{client::legacy::connect::HttpConnector, client::legacy::Client, rt::TokioExecutor};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::config::schema::{GatewayConfig, TimeoutConfig};
use crate::error::{MeshError, Result};
use crate::gateway::forward::{strip_hop_by_hop, ForwardRequest, UpstreamClient};
use crate::http::{request_id, trace_requests, Health};
use crate::load_balancer::BalancerPool;
use crate::observability::metrics;
use crate::registry::{Discovery, Instance};
use crate::resilience::retries::{is_retryable_method, is_transient_status};
use crate::resilience::ResilienceEngine;
use crate::routing::{RouteMatch, Router as RouteTable};

/// Application state injected into the proxy handler.
#[derive(Clone)]
pub struct GatewayState {
    routes: Arc<RouteTable>,
    discovery: Arc<dyn Discovery>,
    balancers: Arc<BalancerPool>,
    engine: Arc<ResilienceEngine>,
    client: UpstreamClient,
    max_body_size: usize,
    upstream_timeout: Duration,
}

/// Edge router in front of the registered services.
pub struct GatewayServer {
    router: Router,
    health: Health,
}

impl GatewayServer {
    pub fn new(
        config: &GatewayConfig,
        timeouts: &TimeoutConfig,
        discovery: Arc<dyn Discovery>,
        engine: Arc<ResilienceEngine>,
    ) -> Self {
        let routes = RouteTable::from_config(config.routes.clone(), config.discovery_locator);
        for route in routes.routes() {
            tracing::info!(
                route = %route.id,
                path = %route.pattern.as_str(),
                service = %route.service,
                policy = ?route.policy,
                "Route loaded"
            );
        }

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(timeouts.idle_secs))
            .build(connector);

        let state = GatewayState {
            routes: Arc::new(routes),
            discovery,
            balancers: Arc::new(BalancerPool::new()),
            engine,
            client,
            max_body_size: config.max_body_size,
            upstream_timeout: Duration::from_secs(timeouts.request_secs),
        };

        let health = Health::new();
        let router = trace_requests(
            Router::new()
                .fallback(proxy_handler)
                .with_state(state)
                .merge(health.router()),
        );
        Self { router, health }
    }

    /// The complete service, for in-process use and tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn health(&self) -> &Health {
        &self.health
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway listening");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

/// Looks up the route, selects an instance and forwards the request.
async fn proxy_handler(State(state): State<GatewayState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let path = request.uri().path().to_string();
    let request_id = request_id(request.headers()).unwrap_or("unknown").to_string();
    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let Some(matched) = state.routes.match_path(&path) else {
        tracing::warn!(request_id = %request_id, path = %path, "No route matched");
        metrics::record_request("none", "none", 404, start);
        return MeshError::NotFound(format!("no route for {}", path)).into_response();
    };

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(request_id = %request_id, path = %path, error = %e, "Request body rejected");
            metrics::record_request(&matched.route_id, &matched.service, 413, start);
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let forward = ForwardRequest::new(
        parts.method.clone(),
        &parts.headers,
        body,
        &path,
        matched.forward_path.clone(),
        parts.uri.query().map(str::to_string),
        client_addr,
        Some(request_id.as_str()),
    );

    let outcome = dispatch(&state, &matched, &forward).await;

    let (status, instance) = match &outcome {
        Ok((instance, response)) => (response.status().as_u16(), Some(instance.instance_id.as_str())),
        Err(e) => (e.status_code().as_u16(), None),
    };
    tracing::info!(
        request_id = %request_id,
        method = %parts.method,
        path = %path,
        rewritten = matched.rewritten.then_some(matched.forward_path.as_str()),
        route = %matched.route_id,
        service = %matched.service,
        instance = instance,
        status,
        latency_ms = start.elapsed().as_millis() as u64,
        "Request proxied"
    );
    metrics::record_request(&matched.route_id, &matched.service, status, start);

    match outcome {
        Ok((_, response)) => {
            let (mut parts, body) = response.into_parts();
            parts.headers = strip_hop_by_hop(&parts.headers);
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => e.into_response(),
    }
}

/// Forward under the route's policy, or as a single plain attempt without one.
async fn dispatch(
    state: &GatewayState,
    matched: &RouteMatch,
    forward: &ForwardRequest,
) -> Result<(Instance, hyper::Response<Incoming>)> {
    let Some(policy_name) = &matched.policy else {
        return attempt(state, matched, forward).await;
    };

    let policy = state.engine.policy(policy_name);
    let op = || async {
        let (instance, response) = attempt(state, matched, forward).await?;
        if is_transient_status(response.status()) {
            return Err(MeshError::Transient(format!(
                "{} ({}) answered {}",
                instance.instance_id,
                instance.address(),
                response.status()
            )));
        }
        Ok((instance, response))
    };

    if is_retryable_method(&forward.method) {
        policy.call(op).await
    } else {
        policy.call_once(op).await
    }
}

/// Resolve, pick and send once.
async fn attempt(
    state: &GatewayState,
    matched: &RouteMatch,
    forward: &ForwardRequest,
) -> Result<(Instance, hyper::Response<Incoming>)> {
    let instances = state.discovery.lookup(&matched.service).await.map_err(|e| {
        MeshError::Unavailable(format!("cannot resolve '{}': {}", matched.service, e))
    })?;
    let instance = state
        .balancers
        .select(&matched.service, &instances)
        .ok_or_else(|| {
            MeshError::Unavailable(format!("no available instance of '{}'", matched.service))
        })?;

    tracing::debug!(
        service = %matched.service,
        instance = %instance.instance_id,
        address = %instance.address(),
        path = %forward.forward_path,
        "Forwarding attempt"
    );
    let response = match forward.send(&state.client, &instance, state.upstream_timeout).await {
        Ok(response) => response,
        Err(e) => {
            if matches!(e, MeshError::Transient(_)) {
                // Connection failed: re-resolve on the next attempt.
                state.discovery.invalidate(&matched.service);
            }
            return Err(e);
        }
    };
    Ok((instance, response))
}
