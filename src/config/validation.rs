//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing policies)
//! - Validate value ranges (timeouts > 0, thresholds in range)
//! - Reject route patterns that cannot be compiled
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MeshConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::{MeshConfig, PolicyConfig};
use crate::routing::matcher::PathPattern;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate the whole configuration, collecting every error.
pub fn validate_config(config: &MeshConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_addr(&mut errors, "registry.bind_address", &config.registry.bind_address);
    check_addr(&mut errors, "config_server.bind_address", &config.config_server.bind_address);
    check_addr(&mut errors, "gateway.bind_address", &config.gateway.bind_address);
    if config.observability.metrics_enabled {
        check_addr(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }

    let registry = &config.registry;
    if registry.lease_duration_secs == 0 {
        errors.push(ValidationError::new("registry.lease_duration_secs", "must be > 0"));
    }
    if registry.eviction_threshold < 1.0 {
        errors.push(ValidationError::new("registry.eviction_threshold", "must be >= 1.0"));
    }
    if registry.eviction_interval_secs == 0 {
        errors.push(ValidationError::new("registry.eviction_interval_secs", "must be > 0"));
    }

    let gateway = &config.gateway;
    check_url(&mut errors, "gateway.registry_url", &gateway.registry_url);
    let mut route_ids = HashSet::new();
    for (i, route) in gateway.routes.iter().enumerate() {
        let field = format!("gateway.routes[{}]", i);
        if !route_ids.insert(route.id.as_str()) {
            errors.push(ValidationError::new(&field, format!("duplicate route id '{}'", route.id)));
        }
        if route.service.trim().is_empty() {
            errors.push(ValidationError::new(format!("{}.service", field), "must not be empty"));
        }
        if let Err(e) = PathPattern::parse(&route.path) {
            errors.push(ValidationError::new(format!("{}.path", field), e));
        }
        if let Some(policy) = &route.policy {
            if !config.resilience.policies.contains_key(policy) {
                errors.push(ValidationError::new(
                    format!("{}.policy", field),
                    format!("unknown policy '{}'", policy),
                ));
            }
        }
    }

    let instance = &config.instance;
    if instance.service_name.trim().is_empty() {
        errors.push(ValidationError::new("instance.service_name", "must not be empty"));
    }
    if instance.heartbeat_interval_secs == 0 {
        errors.push(ValidationError::new("instance.heartbeat_interval_secs", "must be > 0"));
    }
    if instance.config_timeout_secs == 0 {
        errors.push(ValidationError::new("instance.config_timeout_secs", "must be > 0"));
    }
    check_url(&mut errors, "instance.registry_url", &instance.registry_url);
    check_url(&mut errors, "instance.config_url", &instance.config_url);

    check_policy(&mut errors, "resilience.default", &config.resilience.default);
    for (name, policy) in &config.resilience.policies {
        check_policy(&mut errors, &format!("resilience.policies.{}", name), policy);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_addr(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("invalid socket address '{}'", value)));
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if let Err(e) = Url::parse(value) {
        errors.push(ValidationError::new(field, format!("invalid URL '{}': {}", value, e)));
    }
}

fn check_policy(errors: &mut Vec<ValidationError>, field: &str, policy: &PolicyConfig) {
    let breaker = &policy.circuit_breaker;
    if !(breaker.failure_rate_threshold > 0.0 && breaker.failure_rate_threshold <= 1.0) {
        errors.push(ValidationError::new(
            format!("{}.circuit_breaker.failure_rate_threshold", field),
            "must be in (0.0, 1.0]",
        ));
    }
    if breaker.window_secs == 0 {
        errors.push(ValidationError::new(format!("{}.circuit_breaker.window_secs", field), "must be > 0"));
    }
    if policy.bulkhead_max_concurrent_calls == 0 {
        errors.push(ValidationError::new(format!("{}.bulkhead_max_concurrent_calls", field), "must be > 0"));
    }
    if policy.call_timeout_ms == 0 {
        errors.push(ValidationError::new(format!("{}.call_timeout_ms", field), "must be > 0"));
    }
    if policy.backoff.base_delay_ms > policy.backoff.max_delay_ms {
        errors.push(ValidationError::new(
            format!("{}.backoff", field),
            "base_delay_ms must not exceed max_delay_ms",
        ));
    }
}
