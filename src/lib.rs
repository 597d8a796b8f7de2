//! Service mesh substrate.
//!
//! A registry, a config server, a resilience policy engine, a service
//! instance runtime and an API gateway, runnable separately or in one process.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────┐       register / heartbeat / deregister
//!                  │   registry   │◀──────────────────────────────┐
//!                  │ lease table  │                               │
//!                  └──────┬───────┘                               │
//!                         │ lookup                                │
//!                         ▼                                       │
//!  Client ──▶ ┌──────────────────────┐   forward   ┌──────────────┴───────┐
//!             │       gateway        │────────────▶│   service instance   │──▶ peers
//!             │ routing → balancer   │             │ /health /config      │   (discovery +
//!             │ → resilience policy  │             │ /refresh + app API   │    resilience)
//!             └──────────────────────┘             └──────────┬───────────┘
//!                                                             │ fetch
//!                                                             ▼
//!                                                  ┌──────────────────────┐
//!                                                  │    config server     │
//!                                                  │ versioned sources    │
//!                                                  └──────────────────────┘
//!
//!  Cross-cutting: config, error, http, observability, lifecycle
//! ```

// Components
pub mod config_store;
pub mod gateway;
pub mod instance;
pub mod registry;

// Traffic management
pub mod load_balancer;
pub mod resilience;
pub mod routing;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::MeshConfig;
pub use error::{MeshError, Result};
pub use gateway::GatewayServer;
pub use instance::{PeerClient, ServiceInstance};
pub use lifecycle::Shutdown;
pub use registry::Registry;
pub use resilience::ResilienceEngine;
