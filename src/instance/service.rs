//! Service instance lifecycle.
//!
//! # Responsibilities
//! - Load configuration before serving (bounded, falls back to bundled defaults)
//! - Register with the registry and keep the lease alive
//! - Serve the application router plus `/health`, `/config` and `/refresh`
//! - Deregister on shutdown
//!
//! # Data Flow
//! ```text
//! start()  → config client: remote snapshot or fallback
//! run()    → register → heartbeat task → serve → (shutdown) → deregister
//! /refresh → invalidate cache → load → swap snapshot → reload policies
//! ```
//!
//! # Design Decisions
//! - Registration failures never prevent serving; the heartbeat task registers
//!   again as soon as the registry answers `NotFound`
//! - The current snapshot lives in an `ArcSwap`; request handlers never block a refresh
//! - Resilience policies are the process defaults overlaid with the snapshot's
//!   `resilience.*` keys, rebuilt on every refresh

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{extract::State, routing::{get, post}, Json, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::config::schema::{InstanceConfig, ResilienceConfig, TimeoutConfig};
use crate::config_store::{ConfigClient, ConfigSnapshot};
use crate::error::Result;
use crate::http::{instrument, Health};
use crate::instance::heartbeat::HeartbeatTask;
use crate::instance::peer::PeerClient;
use crate::registry::{CachedDiscovery, Instance, RegistryClient};
use crate::resilience::ResilienceEngine;

/// State shared with the built-in endpoints.
#[derive(Clone)]
struct ConfigState {
    client: Arc<ConfigClient>,
    snapshot: Arc<ArcSwap<ConfigSnapshot>>,
    application: String,
    profile: String,
    engine: Arc<ResilienceEngine>,
    resilience: Arc<ArcSwap<ResilienceConfig>>,
}

impl ConfigState {
    /// Rebuild the policies from the base config and the current snapshot.
    /// An invalid override keeps the policies already in force.
    fn reload_policies(&self) {
        let snapshot = self.snapshot.load();
        let base = self.resilience.load();
        match snapshot.overlay("resilience", &**base) {
            Ok(config) => self.engine.reload(&config),
            Err(e) => tracing::warn!(
                application = %self.application,
                error = %e,
                "Ignoring invalid resilience overrides"
            ),
        }
    }
}

/// A running member of the mesh.
pub struct ServiceInstance {
    config: InstanceConfig,
    timeouts: TimeoutConfig,
    instance: Instance,
    registry: RegistryClient,
    config_state: ConfigState,
    health: Health,
}

impl ServiceInstance {
    /// Resolve identity and load configuration. Never fails because the config
    /// server is down.
    pub async fn start(config: InstanceConfig, timeouts: TimeoutConfig) -> Result<Self> {
        let instance_id = config.instance_id.clone().unwrap_or_else(|| {
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            format!("{}-{}", config.service_name.to_lowercase(), &suffix[..8])
        });
        let instance = Instance::new(&config.service_name, instance_id, &config.host, config.port);

        let registry = RegistryClient::new(
            &config.registry_url,
            Duration::from_secs(timeouts.connect_secs.max(1)),
        )?;
        let client = Arc::new(ConfigClient::new(
            &config.config_url,
            Duration::from_secs(config.config_timeout_secs),
            config.defaults.clone(),
        )?);

        let snapshot = client.load(&instance.service_name, &config.profile).await;
        tracing::info!(
            service = %instance.service_name,
            instance_id = %instance.instance_id,
            profile = %config.profile,
            fallback = snapshot.is_fallback(),
            version = ?snapshot.version(),
            "Instance configured"
        );

        let config_state = ConfigState {
            client,
            snapshot: Arc::new(ArcSwap::new(snapshot)),
            application: instance.service_name.clone(),
            profile: config.profile.clone(),
            engine: Arc::new(ResilienceEngine::new(&ResilienceConfig::default())),
            resilience: Arc::new(ArcSwap::from_pointee(ResilienceConfig::default())),
        };
        config_state.reload_policies();

        Ok(Self {
            config,
            timeouts,
            instance,
            registry,
            config_state,
            health: Health::new(),
        })
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Current configuration snapshot.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.config_state.snapshot.load_full()
    }

    pub fn health(&self) -> &Health {
        &self.health
    }

    /// Use `base` as the policy set the config snapshot overrides.
    pub fn with_resilience(self, base: ResilienceConfig) -> Self {
        self.config_state.resilience.store(Arc::new(base));
        self.config_state.reload_policies();
        self
    }

    /// Policies used for outbound calls; replaced in place on refresh.
    pub fn engine(&self) -> Arc<ResilienceEngine> {
        self.config_state.engine.clone()
    }

    /// Client for calling peers through the registry and this instance's policies.
    pub fn peer_client(&self) -> Result<PeerClient> {
        let discovery = CachedDiscovery::new(
            Arc::new(self.registry.clone()),
            Duration::from_secs(self.config.heartbeat_interval_secs.max(1)),
        );
        PeerClient::new(
            Arc::new(discovery),
            self.engine(),
            Duration::from_secs(self.timeouts.request_secs),
        )
    }

    /// Application router merged with the built-in endpoints.
    pub fn router(&self, app: Router) -> Router {
        let builtins = Router::new()
            .route("/config", get(current_config))
            .route("/refresh", post(refresh_config))
            .with_state(self.config_state.clone());
        instrument(
            app.merge(builtins).merge(self.health.router()),
            Duration::from_secs(self.timeouts.request_secs),
        )
    }

    /// Register, serve `app` on `listener` until shutdown, then deregister.
    ///
    /// The advertised port is the listener's, so binding port 0 works.
    pub async fn run(
        mut self,
        listener: TcpListener,
        app: Router,
        mut shutdown: broadcast::Receiver<()>,
    ) -> std::io::Result<()> {
        self.instance.port = listener.local_addr()?.port();
        let router = self.router(app);

        match self.registry.register(&self.instance).await {
            Ok(lease) => tracing::info!(
                service = %self.instance.service_name,
                instance_id = %self.instance.instance_id,
                address = %self.instance.address(),
                lease_secs = lease.duration_secs,
                "Registered with registry"
            ),
            Err(e) => tracing::warn!(
                service = %self.instance.service_name,
                instance_id = %self.instance.instance_id,
                error = %e,
                "Registration failed, heartbeat will retry"
            ),
        }

        let heartbeat = HeartbeatTask::new(
            self.registry.clone(),
            self.instance.clone(),
            Duration::from_secs(self.config.heartbeat_interval_secs),
        );
        let heartbeat_handle = tokio::spawn(heartbeat.run(shutdown.resubscribe()));

        tracing::info!(
            service = %self.instance.service_name,
            address = %listener.local_addr()?,
            "Instance listening"
        );
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        self.health.set_up(false);
        let _ = heartbeat_handle.await;
        match self
            .registry
            .deregister(&self.instance.service_name, &self.instance.instance_id)
            .await
        {
            Ok(()) => tracing::info!(
                service = %self.instance.service_name,
                instance_id = %self.instance.instance_id,
                "Deregistered"
            ),
            Err(e) => tracing::warn!(
                service = %self.instance.service_name,
                instance_id = %self.instance.instance_id,
                error = %e,
                "Deregistration failed, lease will expire"
            ),
        }
        Ok(())
    }
}

async fn current_config(State(state): State<ConfigState>) -> Json<ConfigSnapshot> {
    Json(ConfigSnapshot::clone(&state.snapshot.load()))
}

async fn refresh_config(State(state): State<ConfigState>) -> Json<ConfigSnapshot> {
    state.client.refresh(&state.application);
    let snapshot = state.client.load(&state.application, &state.profile).await;
    state.snapshot.store(snapshot.clone());
    state.reload_policies();
    tracing::info!(
        application = %state.application,
        version = ?snapshot.version(),
        fallback = snapshot.is_fallback(),
        "Config refreshed"
    );
    Json(ConfigSnapshot::clone(&snapshot))
}
