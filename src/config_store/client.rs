//! Consuming-side config client.
//!
//! # Responsibilities
//! - Fetch merged documents from the config server within a bounded timeout
//! - Cache the snapshot per `(application, profile)` until refreshed
//! - Fall back to bundled defaults when the server cannot answer
//!
//! # Design Decisions
//! - An unreachable server never fails startup
//! - A previously fetched snapshot beats bundled defaults when the server is down
//! - A document older than the cached one is never adopted

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config_store::repository::ConfigDocument;
use crate::config_store::source::Properties;
use crate::error::{MeshError, Result};
use crate::http::client::{error_from_response, ApiClient};
use crate::observability::metrics;

/// Where a snapshot came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnapshotSource {
    Remote { version: u64 },
    Fallback { reason: String },
}

/// Configuration as seen by a consuming service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub application: String,
    pub profile: String,
    pub source: SnapshotSource,
    pub properties: Properties,
}

impl ConfigSnapshot {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Typed accessor; `None` when missing or of the wrong shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// `base` with every property under `prefix.` written over it.
    ///
    /// Dotted keys address nested fields, so `resilience.default.max_retries`
    /// overrides `default.max_retries` of a `ResilienceConfig`.
    pub fn overlay<T>(&self, prefix: &str, base: &T) -> serde_json::Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut merged = serde_json::to_value(base)?;
        let prefix = format!("{}.", prefix);
        for (key, value) in &self.properties {
            if let Some(path) = key.strip_prefix(&prefix) {
                set_path(&mut merged, path, value.clone());
            }
        }
        serde_json::from_value(merged)
    }

    pub fn version(&self) -> Option<u64> {
        match self.source {
            SnapshotSource::Remote { version } => Some(version),
            SnapshotSource::Fallback { .. } => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.source, SnapshotSource::Fallback { .. })
    }
}

fn set_path(target: &mut Value, path: &str, value: Value) {
    let mut current = target;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        current = map.entry(segment.to_string()).or_insert(Value::Null);
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: Arc<ConfigSnapshot>,
    fresh: bool,
}

/// Client for the config server with snapshot cache and fallback defaults.
#[derive(Debug)]
pub struct ConfigClient {
    api: ApiClient,
    defaults: Properties,
    cache: DashMap<(String, String), CacheEntry>,
}

impl ConfigClient {
    /// `timeout` bounds every fetch, including connection establishment.
    pub fn new(base_url: &str, timeout: Duration, defaults: Properties) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new(base_url, timeout)?,
            defaults,
            cache: DashMap::new(),
        })
    }

    /// Fetch the current document from the server, bypassing the cache.
    ///
    /// Transport failures and server errors become `ConfigUnreachable`.
    pub async fn fetch(&self, application: &str, profile: &str) -> Result<ConfigDocument> {
        let url = self.api.url(&[application, profile]);
        let response = self
            .api
            .http()
            .get(url)
            .send()
            .await
            .map_err(|e| MeshError::ConfigUnreachable(e.to_string()))?;

        if response.status().is_success() {
            return response
                .json()
                .await
                .map_err(|e| MeshError::ConfigUnreachable(format!("invalid document: {}", e)));
        }
        match error_from_response(response).await {
            MeshError::NotFound(message) => Err(MeshError::NotFound(message)),
            other => Err(MeshError::ConfigUnreachable(other.to_string())),
        }
    }

    /// Cached snapshot, fetching on first use or after `refresh`. Never fails.
    pub async fn load(&self, application: &str, profile: &str) -> Arc<ConfigSnapshot> {
        let key = (application.to_lowercase(), profile.to_lowercase());
        let previous = self.cache.get(&key).map(|e| e.value().clone());
        if let Some(entry) = &previous {
            if entry.fresh {
                return entry.snapshot.clone();
            }
        }

        let snapshot = match self.fetch(&key.0, &key.1).await {
            Ok(doc) => match previous.as_ref() {
                Some(entry) if entry.snapshot.version().is_some_and(|cached| cached > doc.version) => {
                    tracing::warn!(
                        application = %key.0,
                        cached = ?entry.snapshot.version(),
                        fetched = doc.version,
                        "Ignoring config older than cached snapshot"
                    );
                    metrics::record_config_fetch(&key.0, "stale");
                    entry.snapshot.clone()
                }
                _ => {
                    tracing::info!(
                        application = %key.0,
                        profile = %key.1,
                        version = doc.version,
                        sources = ?doc.sources,
                        "Config loaded"
                    );
                    metrics::record_config_fetch(&key.0, "remote");
                    Arc::new(ConfigSnapshot {
                        application: doc.application,
                        profile: doc.profile,
                        source: SnapshotSource::Remote { version: doc.version },
                        properties: doc.properties,
                    })
                }
            },
            Err(e @ MeshError::ConfigUnreachable(_)) => {
                match previous.as_ref().filter(|p| !p.snapshot.is_fallback()) {
                    Some(entry) => {
                        tracing::warn!(
                            application = %key.0,
                            error = %e,
                            "Config server unreachable, keeping last snapshot"
                        );
                        metrics::record_config_fetch(&key.0, "stale");
                        entry.snapshot.clone()
                    }
                    None => self.fallback(&key, &e),
                }
            }
            Err(e) => self.fallback(&key, &e),
        };

        self.cache.insert(
            key,
            CacheEntry {
                snapshot: snapshot.clone(),
                fresh: true,
            },
        );
        snapshot
    }

    /// Invalidate every cached profile of `application`; the next `load` refetches.
    pub fn refresh(&self, application: &str) {
        let application = application.to_lowercase();
        for mut entry in self.cache.iter_mut() {
            if entry.key().0 == application {
                entry.fresh = false;
            }
        }
        tracing::info!(application = %application, "Config snapshot invalidated");
    }

    fn fallback(&self, key: &(String, String), error: &MeshError) -> Arc<ConfigSnapshot> {
        tracing::warn!(
            application = %key.0,
            profile = %key.1,
            error = %error,
            "Using bundled default configuration"
        );
        metrics::record_config_fetch(&key.0, "fallback");
        Arc::new(ConfigSnapshot {
            application: key.0.clone(),
            profile: key.1.clone(),
            source: SnapshotSource::Fallback {
                reason: error.kind().to_string(),
            },
            properties: self.defaults.clone(),
        })
    }
}
