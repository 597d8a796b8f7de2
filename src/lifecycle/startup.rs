//! Startup orchestration.
//!
//! # Responsibilities
//! - Build each component from its config section
//! - Bind listeners and start serving
//! - Start background tasks (eviction sweep, repository watcher, heartbeat)
//! - Host several components in one process for `all`
//!
//! # Design Decisions
//! - Fail fast: a bind or build error is fatal
//! - In `all` mode the gateway resolves through the in-process registry
//! - Every task stops on the shared `Shutdown`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::schema::MeshConfig;
use crate::config::ConfigError;
use crate::config_store::{self, ConfigRepository, RepositoryWatcher};
use crate::error::MeshError;
use crate::gateway::GatewayServer;
use crate::http::{instrument, Health};
use crate::instance::ServiceInstance;
use crate::lifecycle::Shutdown;
use crate::registry::{self, CachedDiscovery, Discovery, EvictionTask, Registry, RegistryClient};
use crate::resilience::ResilienceEngine;

/// Which part of the mesh a process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Registry,
    ConfigServer,
    Gateway,
    Instance,
    All,
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("cannot bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Mesh(#[from] MeshError),
    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

type ServeHandle = JoinHandle<std::io::Result<()>>;

/// Run `component` until `shutdown` fires.
pub async fn run(component: Component, config: MeshConfig, shutdown: Shutdown) -> Result<(), StartupError> {
    let handles = match component {
        Component::Registry => {
            let registry = Arc::new(Registry::new(config.registry.clone()));
            vec![serve_registry(&config, registry, &shutdown).await?]
        }
        Component::ConfigServer => vec![serve_config_server(&config, &shutdown).await?],
        Component::Gateway => {
            let client = RegistryClient::new(
                &config.gateway.registry_url,
                Duration::from_secs(config.timeouts.connect_secs),
            )?;
            let discovery = CachedDiscovery::new(
                Arc::new(client),
                Duration::from_secs(config.gateway.registry_fetch_interval_secs),
            );
            vec![serve_gateway(&config, Arc::new(discovery), &shutdown).await?]
        }
        Component::Instance => vec![serve_instance(&config, Router::new(), &shutdown).await?],
        Component::All => {
            let registry = Arc::new(Registry::new(config.registry.clone()));
            let mut handles = vec![
                serve_registry(&config, registry.clone(), &shutdown).await?,
                serve_config_server(&config, &shutdown).await?,
            ];
            handles.push(serve_gateway(&config, registry, &shutdown).await?);
            handles.push(serve_instance(&config, Router::new(), &shutdown).await?);
            handles
        }
    };

    for handle in handles {
        handle.await??;
    }
    Ok(())
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.to_string(),
            source,
        })
}

async fn until(mut shutdown: broadcast::Receiver<()>) {
    let _ = shutdown.recv().await;
}

/// Registry API plus the eviction sweep.
pub async fn serve_registry(
    config: &MeshConfig,
    registry: Arc<Registry>,
    shutdown: &Shutdown,
) -> Result<ServeHandle, StartupError> {
    let listener = bind(&config.registry.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        lease_secs = config.registry.lease_duration_secs,
        strict = config.registry.strict,
        "Registry listening"
    );

    tokio::spawn(EvictionTask::new(registry.clone()).run(shutdown.subscribe()));

    let app = instrument(
        registry::api::router(registry, Health::new()),
        Duration::from_secs(config.timeouts.request_secs),
    );
    let rx = shutdown.subscribe();
    Ok(tokio::spawn(async move {
        axum::serve(listener, app).with_graceful_shutdown(until(rx)).await
    }))
}

/// Config server API, seeded from and watching the repository directory.
pub async fn serve_config_server(config: &MeshConfig, shutdown: &Shutdown) -> Result<ServeHandle, StartupError> {
    let repository = Arc::new(ConfigRepository::new());
    let mut watcher = None;

    if let Some(path) = config.config_server.repo_path.as_ref().map(PathBuf::from) {
        if path.is_dir() {
            let loaded = repository.load_dir(&path)?;
            tracing::info!(path = %path.display(), sources = loaded, "Config repository loaded");
            if config.config_server.watch {
                match RepositoryWatcher::new(&path, repository.clone()).run() {
                    Ok(w) => watcher = Some(w),
                    Err(e) => tracing::warn!(path = %path.display(), error = %e, "Cannot watch config repository"),
                }
            }
        } else {
            tracing::warn!(path = %path.display(), "Config repository directory not found, starting empty");
        }
    }

    let listener = bind(&config.config_server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Config server listening");

    let app = instrument(
        config_store::api::router(repository, Health::new()),
        Duration::from_secs(config.timeouts.request_secs),
    );
    let rx = shutdown.subscribe();
    Ok(tokio::spawn(async move {
        // The watcher stops when dropped.
        let _watcher = watcher;
        axum::serve(listener, app).with_graceful_shutdown(until(rx)).await
    }))
}

/// Gateway resolving through `discovery`.
pub async fn serve_gateway(
    config: &MeshConfig,
    discovery: Arc<dyn Discovery>,
    shutdown: &Shutdown,
) -> Result<ServeHandle, StartupError> {
    let engine = Arc::new(ResilienceEngine::new(&config.resilience));
    let server = GatewayServer::new(&config.gateway, &config.timeouts, discovery, engine);
    let listener = bind(&config.gateway.bind_address).await?;
    let rx = shutdown.subscribe();
    Ok(tokio::spawn(server.run(listener, rx)))
}

/// Service instance serving `app` next to the built-in endpoints.
pub async fn serve_instance(
    config: &MeshConfig,
    app: Router,
    shutdown: &Shutdown,
) -> Result<ServeHandle, StartupError> {
    let instance = ServiceInstance::start(config.instance.clone(), config.timeouts.clone())
        .await?
        .with_resilience(config.resilience.clone());
    let listener = bind(&format!("0.0.0.0:{}", config.instance.port)).await?;
    let rx = shutdown.subscribe();
    Ok(tokio::spawn(instance.run(listener, app, rx)))
}
