//! Upstream request construction and header hygiene.
//!
//! # Responsibilities
//! - Build the upstream URI from the chosen instance, rewritten path and query
//! - Copy end-to-end headers, dropping hop-by-hop ones and `Host`
//! - Add `x-forwarded-for`, `x-forwarded-prefix` and the request ID
//! - Send one attempt and classify the outcome

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, Response, Uri, Version};
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};

use crate::error::{MeshError, Result};
use crate::http::request::X_REQUEST_ID;
use crate::registry::Instance;

pub type UpstreamClient = Client<HttpConnector, Body>;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_PREFIX: &str = "x-forwarded-prefix";

/// Connection-scoped headers that must not be forwarded.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Everything needed to replay the request against any instance.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub forward_path: String,
    pub query: Option<String>,
}

impl ForwardRequest {
    /// Capture the parts of an inbound request and prepare forwarding headers.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        method: Method,
        inbound: &HeaderMap,
        body: Bytes,
        original_path: &str,
        forward_path: String,
        query: Option<String>,
        client_addr: Option<SocketAddr>,
        request_id: Option<&str>,
    ) -> Self {
        let mut headers = strip_hop_by_hop(inbound);
        headers.remove(header::HOST);

        if let Some(addr) = client_addr {
            let ip = addr.ip().to_string();
            let value = match inbound.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
                Some(existing) => format!("{}, {}", existing, ip),
                None => ip,
            };
            if let Ok(value) = HeaderValue::from_str(&value) {
                headers.insert(X_FORWARDED_FOR, value);
            }
        }

        if let Some(prefix) = stripped_prefix(original_path, &forward_path) {
            if let Ok(value) = HeaderValue::from_str(prefix) {
                headers.insert(X_FORWARDED_PREFIX, value);
            }
        }

        if let Some(id) = request_id.and_then(|id| HeaderValue::from_str(id).ok()) {
            headers.insert(X_REQUEST_ID, id);
        }

        Self {
            method,
            headers,
            body,
            forward_path,
            query,
        }
    }

    pub fn uri_for(&self, instance: &Instance) -> Result<Uri> {
        let target = match &self.query {
            Some(query) => format!("http://{}{}?{}", instance.address(), self.forward_path, query),
            None => format!("http://{}{}", instance.address(), self.forward_path),
        };
        target
            .parse()
            .map_err(|e| MeshError::BadRequest(format!("invalid upstream uri '{}': {}", target, e)))
    }

    /// Send one attempt to `instance`. Connection failures are `Transient`,
    /// an expired deadline is `TimedOut`; any HTTP response is `Ok`.
    pub async fn send(
        &self,
        client: &UpstreamClient,
        instance: &Instance,
        timeout: Duration,
    ) -> Result<Response<Incoming>> {
        let mut builder = Request::builder()
            .method(self.method.clone())
            .uri(self.uri_for(instance)?)
            .version(Version::HTTP_11);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(self.headers.clone());
        }
        let request = builder
            .body(Body::from(self.body.clone()))
            .map_err(|e| MeshError::BadRequest(e.to_string()))?;

        match tokio::time::timeout(timeout, client.request(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(MeshError::Transient(format!(
                "{} ({}): {}",
                instance.instance_id,
                instance.address(),
                e
            ))),
            Err(_) => Err(MeshError::TimedOut(format!(
                "{} ({}) did not answer within {}ms",
                instance.instance_id,
                instance.address(),
                timeout.as_millis()
            ))),
        }
    }
}

pub fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    // Headers named in `Connection` are hop-by-hop too.
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in HOP_BY_HOP.iter().chain(listed.iter()) {
        out.remove(name);
    }
    out
}

/// The leading part of `original` removed by a rewrite, when the rewrite was a strip.
fn stripped_prefix<'a>(original: &'a str, forward: &str) -> Option<&'a str> {
    if original == forward || forward == "/" && original.len() <= 1 {
        return None;
    }
    if forward == "/" {
        return Some(original.trim_end_matches('/'));
    }
    original
        .strip_suffix(forward)
        .filter(|prefix| !prefix.is_empty())
}
