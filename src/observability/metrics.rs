//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): proxied requests by route, service, status
//! - `gateway_request_duration_seconds` (histogram): proxy latency
//! - `registry_instances` (gauge): registered instances per service
//! - `registry_evictions_total` (counter): instances removed by the sweep
//! - `resilience_rejections_total` (counter): calls refused by policy, by reason
//! - `resilience_retries_total` (counter): retry attempts per policy
//! - `circuit_breaker_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `config_fetch_total` (counter): config loads by outcome
//!
//! # Design Decisions
//! - Recording is a no-op until `init_metrics` installs the exporter
//! - Labels for route, service, policy, status code

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(route: &str, service: &str, status: u16, start: Instant) {
    let labels = [
        ("route", route.to_string()),
        ("service", service.to_string()),
        ("status", status.to_string()),
    ];
    counter!("gateway_requests_total", &labels[..]).increment(1);
    histogram!("gateway_request_duration_seconds", &labels[..2])
        .record(start.elapsed().as_secs_f64());
}

pub fn record_registry_instances(service: &str, count: usize) {
    gauge!("registry_instances", "service" => service.to_string()).set(count as f64);
}

pub fn record_eviction(service: &str) {
    counter!("registry_evictions_total", "service" => service.to_string()).increment(1);
}

pub fn record_rejection(policy: &str, reason: &'static str) {
    counter!(
        "resilience_rejections_total",
        "policy" => policy.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_retry(policy: &str) {
    counter!("resilience_retries_total", "policy" => policy.to_string()).increment(1);
}

pub fn record_breaker_state(policy: &str, state: u8) {
    gauge!("circuit_breaker_state", "policy" => policy.to_string()).set(state as f64);
}

pub fn record_config_fetch(application: &str, outcome: &'static str) {
    counter!(
        "config_fetch_total",
        "application" => application.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
