//! Repository directory watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config_store::repository::ConfigRepository;

/// Re-commits the repository directory whenever a file in it changes.
pub struct RepositoryWatcher {
    path: PathBuf,
    repository: Arc<ConfigRepository>,
}

impl RepositoryWatcher {
    pub fn new(path: &Path, repository: Arc<ConfigRepository>) -> Self {
        Self {
            path: path.to_path_buf(),
            repository,
        }
    }

    /// Start watching in the background. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();
        let repository = self.repository;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove() {
                        match repository.load_dir(&path) {
                            Ok(0) => {}
                            Ok(changed) => {
                                tracing::info!(changed, "Config repository reloaded");
                            }
                            Err(e) => {
                                tracing::error!(
                                    "Failed to reload config repository: {}. Keeping current sources.",
                                    e
                                );
                            }
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config repository watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_change_is_committed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("limits.toml"), "minimum = 3\n").unwrap();

        let repository = Arc::new(ConfigRepository::new());
        repository.load_dir(dir.path()).unwrap();
        let _watcher = RepositoryWatcher::new(dir.path(), repository.clone()).run().unwrap();

        std::fs::write(dir.path().join("limits.toml"), "minimum = 9\n").unwrap();

        let mut observed = None;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let doc = repository.fetch("limits", "default").unwrap();
            if doc.properties.get("minimum") == Some(&serde_json::json!(9)) {
                observed = Some(doc.version);
                break;
            }
        }
        assert!(observed.unwrap_or(0) > 1, "watcher should commit the edited file");
    }
}
