//! Versioned property-source repository.
//!
//! # Merge Order
//! ```text
//! lowest   application            shared defaults for every app
//!          {app}                  app defaults
//!          application-{profile}  shared profile overrides
//! highest  {app}-{profile}        app profile overrides
//! ```
//!
//! # Design Decisions
//! - Versions come from one global commit counter, so a document's version
//!   (the max of its sources) never goes backwards
//! - Committing identical content keeps the existing version
//! - A removal is a commit too: the source stays behind as a tombstone
//!   carrying a fresh version, so documents that lose a layer still move forward

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::loader::ConfigError;
use crate::config_store::source::{load_directory, source_name, Properties};
use crate::error::{MeshError, Result};

/// Name of the shared source applied to every application.
pub const SHARED_APPLICATION: &str = "application";

#[derive(Debug, Clone)]
struct PropertySource {
    properties: Properties,
    version: u64,
    removed: bool,
}

/// Merged configuration returned to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    pub application: String,
    pub profile: String,
    pub version: u64,
    /// Applied sources, highest precedence first.
    pub sources: Vec<String>,
    pub properties: Properties,
}

/// Source of truth for configuration.
#[derive(Debug, Default)]
pub struct ConfigRepository {
    sources: DashMap<String, PropertySource>,
    commits: AtomicU64,
}

impl ConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store properties for `(application, profile)`. Returns the source version.
    pub fn commit(&self, application: &str, profile: &str, properties: Properties) -> u64 {
        let name = source_name(&application.to_lowercase(), &profile.to_lowercase());
        self.commit_source(&name, properties)
    }

    fn commit_source(&self, name: &str, properties: Properties) -> u64 {
        let mut entry = self.sources.entry(name.to_string()).or_insert_with(|| PropertySource {
            properties: Properties::new(),
            version: 0,
            removed: false,
        });
        if entry.version > 0 && !entry.removed && entry.properties == properties {
            return entry.version;
        }

        let version = self.next_version();
        entry.properties = properties;
        entry.version = version;
        entry.removed = false;
        tracing::info!(source = %name, version, "Config source committed");
        version
    }

    /// Remove a source. Returns false when there was nothing to remove.
    pub fn remove(&self, application: &str, profile: &str) -> bool {
        let name = source_name(&application.to_lowercase(), &profile.to_lowercase());
        self.remove_source(&name)
    }

    fn remove_source(&self, name: &str) -> bool {
        let Some(mut entry) = self.sources.get_mut(name) else {
            return false;
        };
        if entry.removed {
            return false;
        }
        let version = self.next_version();
        entry.properties = Properties::new();
        entry.version = version;
        entry.removed = true;
        tracing::info!(source = %name, version, "Config source removed");
        true
    }

    fn next_version(&self) -> u64 {
        self.commits.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_live(&self, name: &str) -> bool {
        self.sources.get(name).is_some_and(|s| !s.removed)
    }

    /// Merge the sources for `(application, profile)`.
    ///
    /// `NotFound` unless at least one application-specific source exists.
    pub fn fetch(&self, application: &str, profile: &str) -> Result<ConfigDocument> {
        let application = application.to_lowercase();
        let profile = profile.to_lowercase();

        let app_default = source_name(&application, "default");
        let app_profile = source_name(&application, &profile);
        if !self.is_live(&app_default) && !self.is_live(&app_profile) {
            return Err(MeshError::NotFound(format!("config {}/{}", application, profile)));
        }

        let layers = [
            SHARED_APPLICATION.to_string(),
            app_default,
            source_name(SHARED_APPLICATION, &profile),
            app_profile,
        ];

        let mut seen = BTreeSet::new();
        let mut properties = Properties::new();
        let mut sources = Vec::new();
        let mut version = 0;
        for name in layers.iter().filter(|n| seen.insert(n.as_str())) {
            if let Some(source) = self.sources.get(name) {
                // Tombstones still count toward the version.
                version = version.max(source.version);
                if !source.removed {
                    properties.extend(source.properties.clone());
                    sources.push(name.clone());
                }
            }
        }
        sources.reverse();

        Ok(ConfigDocument {
            application,
            profile,
            version,
            sources,
            properties,
        })
    }

    /// Synchronize with a directory: commit every file, drop sources whose file is gone.
    /// Returns the number of sources that changed.
    pub fn load_dir(&self, dir: &Path) -> std::result::Result<usize, ConfigError> {
        let loaded = load_directory(dir)?;
        let mut changed = 0;

        for (name, properties) in &loaded {
            let before = self.sources.get(name).filter(|s| !s.removed).map(|s| s.version);
            let after = self.commit_source(name, properties.clone());
            if before != Some(after) {
                changed += 1;
            }
        }

        let stale: Vec<String> = self
            .sources
            .iter()
            .filter(|entry| !entry.removed && !loaded.contains_key(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        for name in stale {
            if self.remove_source(&name) {
                changed += 1;
            }
        }

        Ok(changed)
    }

    /// Names of all live sources, sorted.
    pub fn source_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .sources
            .iter()
            .filter(|e| !e.removed)
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(pairs: &[(&str, serde_json::Value)]) -> Properties {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_missing_application_is_not_found() {
        let repo = ConfigRepository::new();
        repo.commit("application", "default", props(&[("shared", json!(true))]));
        let err = repo.fetch("limits", "default").unwrap_err();
        assert!(matches!(err, MeshError::NotFound(_)));
    }

    #[test]
    fn test_profile_overrides_default() {
        let repo = ConfigRepository::new();
        repo.commit("application", "default", props(&[("shared", json!(1)), ("minimum", json!(0))]));
        repo.commit("limits", "default", props(&[("minimum", json!(3)), ("maximum", json!(997))]));
        repo.commit("application", "dev", props(&[("shared", json!(2))]));
        repo.commit("limits", "dev", props(&[("maximum", json!(111))]));

        let doc = repo.fetch("limits", "dev").unwrap();
        assert_eq!(doc.properties["minimum"], json!(3));
        assert_eq!(doc.properties["maximum"], json!(111));
        assert_eq!(doc.properties["shared"], json!(2));
        assert_eq!(doc.sources, vec!["limits-dev", "application-dev", "limits", "application"]);
        assert_eq!(doc.version, 4);

        let doc = repo.fetch("limits", "default").unwrap();
        assert_eq!(doc.properties["maximum"], json!(997));
        assert_eq!(doc.sources, vec!["limits", "application"]);
    }

    #[test]
    fn test_profile_only_source_is_enough() {
        let repo = ConfigRepository::new();
        repo.commit("limits", "qa", props(&[("minimum", json!(7))]));
        assert_eq!(repo.fetch("limits", "qa").unwrap().properties["minimum"], json!(7));
        assert!(repo.fetch("limits", "default").is_err());
    }

    #[test]
    fn test_commit_observed_by_next_fetch() {
        let repo = ConfigRepository::new();
        let v1 = repo.commit("limits", "default", props(&[("minimum", json!(3))]));
        let unchanged = repo.commit("limits", "default", props(&[("minimum", json!(3))]));
        assert_eq!(v1, unchanged);

        let v2 = repo.commit("limits", "default", props(&[("minimum", json!(4))]));
        assert!(v2 > v1);
        let doc = repo.fetch("LIMITS", "default").unwrap();
        assert_eq!(doc.version, v2);
        assert_eq!(doc.properties["minimum"], json!(4));
    }

    #[test]
    fn test_load_dir_tracks_changes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("limits.toml"), "minimum = 3\nmaximum = 997\n").unwrap();
        std::fs::write(dir.path().join("exchange.toml"), "rate = 1.0\n").unwrap();

        let repo = ConfigRepository::new();
        assert_eq!(repo.load_dir(dir.path()).unwrap(), 2);
        assert_eq!(repo.load_dir(dir.path()).unwrap(), 0);

        std::fs::write(dir.path().join("limits.toml"), "minimum = 5\n").unwrap();
        std::fs::remove_file(dir.path().join("exchange.toml")).unwrap();
        assert_eq!(repo.load_dir(dir.path()).unwrap(), 2);

        assert_eq!(repo.source_names(), vec!["limits"]);
        let doc = repo.fetch("limits", "default").unwrap();
        assert_eq!(doc.properties["minimum"], json!(5));
        assert!(!doc.properties.contains_key("maximum"));
        assert!(matches!(repo.fetch("exchange", "default"), Err(MeshError::NotFound(_))));

        // A file that comes back is a new commit.
        std::fs::write(dir.path().join("exchange.toml"), "rate = 1.0\n").unwrap();
        assert_eq!(repo.load_dir(dir.path()).unwrap(), 1);
        assert_eq!(repo.fetch("exchange", "default").unwrap().properties["rate"], json!(1.0));
    }

    #[test]
    fn test_removing_a_layer_moves_version_forward() {
        let repo = ConfigRepository::new();
        repo.commit("limits", "default", props(&[("maximum", json!(999))]));
        repo.commit("limits", "dev", props(&[("maximum", json!(111))]));
        let before = repo.fetch("limits", "dev").unwrap();
        assert_eq!(before.properties["maximum"], json!(111));

        assert!(repo.remove("limits", "dev"));
        assert!(!repo.remove("limits", "dev"));

        let after = repo.fetch("limits", "dev").unwrap();
        assert_eq!(after.properties["maximum"], json!(999));
        assert_eq!(after.sources, vec!["limits"]);
        assert!(after.version > before.version);

        // Re-adding identical content after a removal is still a change.
        let readded = repo.commit("limits", "dev", props(&[("maximum", json!(111))]));
        assert!(readded > after.version);
        assert_eq!(repo.fetch("limits", "dev").unwrap().properties["maximum"], json!(111));
    }
}
