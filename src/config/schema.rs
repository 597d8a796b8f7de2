//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for every mesh
//! component. All types derive Serde traits for deserialization from config files.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration shared by all components.
///
/// Each component only reads its own section; the file can be shared.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MeshConfig {
    /// Discovery registry settings.
    pub registry: RegistryConfig,

    /// Config server settings.
    pub config_server: ConfigServerConfig,

    /// Gateway settings and route table.
    pub gateway: GatewayConfig,

    /// Generic service instance settings.
    pub instance: InstanceConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Named outbound call policies.
    pub resilience: ResilienceConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Bind address (e.g., "0.0.0.0:8761").
    pub bind_address: String,

    /// Lease validity in seconds; renewed by every heartbeat.
    pub lease_duration_secs: u64,

    /// Heartbeat interval advertised to registering instances.
    pub renewal_interval_secs: u64,

    /// Multiplier applied to the lease before an instance is evicted.
    pub eviction_threshold: f64,

    /// Eviction sweep interval in seconds.
    pub eviction_interval_secs: u64,

    /// Reject re-registration with conflicting host/port.
    pub strict: bool,
}

impl RegistryConfig {
    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_secs)
    }

    /// Age after which an instance is removed by the sweep.
    pub fn eviction_age(&self) -> Duration {
        self.lease_duration().mul_f64(self.eviction_threshold)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8761".to_string(),
            lease_duration_secs: 30,
            renewal_interval_secs: 10,
            eviction_threshold: 1.5,
            eviction_interval_secs: 10,
            strict: false,
        }
    }
}

/// Config server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfigServerConfig {
    /// Bind address (e.g., "0.0.0.0:8888").
    pub bind_address: String,

    /// Directory holding `{app}.toml` and `{app}-{profile}.toml` files.
    pub repo_path: Option<String>,

    /// Reload the repository when files change.
    pub watch: bool,
}

impl Default for ConfigServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8888".to_string(),
            repo_path: Some("config-repo".to_string()),
            watch: true,
        }
    }
}

/// Gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Bind address (e.g., "0.0.0.0:8765").
    pub bind_address: String,

    /// Base URL of the registry.
    pub registry_url: String,

    /// How long a registry lookup is served from cache, in seconds.
    pub registry_fetch_interval_secs: u64,

    /// Route `/{service}/**` to `service` when no static route matches.
    pub discovery_locator: bool,

    /// Maximum buffered request body in bytes.
    pub max_body_size: usize,

    /// Ordered route table; first match wins.
    pub routes: Vec<RouteConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8765".to_string(),
            registry_url: "http://127.0.0.1:8761".to_string(),
            registry_fetch_interval_secs: 5,
            discovery_locator: false,
            max_body_size: 2 * 1024 * 1024, // 2MB
            routes: Vec::new(),
        }
    }
}

/// Route configuration mapping a path pattern to a service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub id: String,

    /// Path pattern, e.g. `/currency-exchange/**`.
    pub path: String,

    /// Service name resolved through the registry.
    pub service: String,

    /// Optional path rewrite applied before forwarding.
    #[serde(default)]
    pub rewrite: Option<RewriteConfig>,

    /// Optional named resilience policy wrapping the forward.
    #[serde(default)]
    pub policy: Option<String>,
}

/// Path rewrite rules.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteConfig {
    /// Drop the first `n` path segments.
    StripPrefix(usize),
    /// Replace a literal leading prefix.
    ReplacePrefix { from: String, to: String },
}

/// Service instance configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Logical service name, also the config application name.
    pub service_name: String,

    /// Unique id within the service; generated when absent.
    pub instance_id: Option<String>,

    /// Host advertised to the registry.
    pub host: String,

    /// Listening port; also advertised.
    pub port: u16,

    /// Config profile to fetch.
    pub profile: String,

    /// Base URL of the registry.
    pub registry_url: String,

    /// Base URL of the config server.
    pub config_url: String,

    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,

    /// Bound on the startup config fetch, in seconds.
    pub config_timeout_secs: u64,

    /// Bundled defaults used when the config server cannot answer.
    pub defaults: BTreeMap<String, serde_json::Value>,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            service_name: "service".to_string(),
            instance_id: None,
            host: "127.0.0.1".to_string(),
            port: 8000,
            profile: "default".to_string(),
            registry_url: "http://127.0.0.1:8761".to_string(),
            config_url: "http://127.0.0.1:8888".to_string(),
            heartbeat_interval_secs: 10,
            config_timeout_secs: 5,
            defaults: BTreeMap::new(),
        }
    }
}

/// Timeout configuration for HTTP surfaces and outbound calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Idle connection timeout in seconds.
    pub idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            idle_secs: 60,
        }
    }
}

/// Named resilience policies.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Applied to call names without an explicit entry.
    pub default: PolicyConfig,

    /// Per outbound call name.
    pub policies: HashMap<String, PolicyConfig>,
}

/// Policy attached to one named outbound call.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Re-invocations after the first attempt.
    pub max_retries: u32,

    /// Backoff between retries.
    pub backoff: BackoffConfig,

    /// Permits per second; 0 disables the limiter.
    pub rate_limit_per_second: u32,

    /// Burst capacity; defaults to the per-second rate when 0.
    pub rate_limit_burst: u32,

    /// Hard ceiling on concurrent in-flight calls.
    pub bulkhead_max_concurrent_calls: usize,

    /// Time to wait for a bulkhead slot; 0 rejects immediately.
    pub bulkhead_max_wait_ms: u64,

    /// Circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Per-attempt deadline in milliseconds.
    pub call_timeout_ms: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: BackoffConfig::default(),
            rate_limit_per_second: 0,
            rate_limit_burst: 0,
            bulkhead_max_concurrent_calls: 25,
            bulkhead_max_wait_ms: 0,
            circuit_breaker: CircuitBreakerConfig::default(),
            call_timeout_ms: 5_000,
        }
    }
}

/// Exponential backoff configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failure ratio (0.0..=1.0) that opens the circuit.
    pub failure_rate_threshold: f64,

    /// Calls required in the window before the ratio is evaluated.
    pub minimum_calls: usize,

    /// Rolling window length in seconds.
    pub window_secs: u64,

    /// Time spent open before a probe is admitted.
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            minimum_calls: 10,
            window_secs: 60,
            cooldown_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config: MeshConfig = toml::from_str("").unwrap();
        assert_eq!(config.registry.lease_duration_secs, 30);
        assert_eq!(config.instance.config_timeout_secs, 5);
        assert!(config.gateway.routes.is_empty());
    }

    #[test]
    fn test_routes_and_policies_parse() {
        let config: MeshConfig = toml::from_str(
            r#"
            [[gateway.routes]]
            id = "exchange"
            path = "/exchange/**"
            service = "exchange"

            [[gateway.routes]]
            id = "conversion-new"
            path = "/conversion-new/**"
            service = "conversion"
            rewrite = { replace_prefix = { from = "/conversion-new", to = "/conversion-feign" } }
            policy = "conversion"

            [resilience.policies.conversion]
            max_retries = 4
            circuit_breaker = { failure_rate_threshold = 0.25, minimum_calls = 4 }

            [instance.defaults]
            minimum = 3
            maximum = 997
            "#,
        )
        .unwrap();

        assert_eq!(config.gateway.routes.len(), 2);
        assert_eq!(config.gateway.routes[0].rewrite, None);
        assert_eq!(
            config.gateway.routes[1].rewrite,
            Some(RewriteConfig::ReplacePrefix {
                from: "/conversion-new".into(),
                to: "/conversion-feign".into(),
            })
        );
        let policy = &config.resilience.policies["conversion"];
        assert_eq!(policy.max_retries, 4);
        assert_eq!(policy.circuit_breaker.minimum_calls, 4);
        assert_eq!(policy.circuit_breaker.cooldown_secs, 30);
        assert_eq!(config.instance.defaults["maximum"], serde_json::json!(997));
    }

    #[test]
    fn test_eviction_age() {
        let registry = RegistryConfig {
            lease_duration_secs: 30,
            eviction_threshold: 1.5,
            ..Default::default()
        };
        assert_eq!(registry.eviction_age(), Duration::from_secs(45));
    }
}
