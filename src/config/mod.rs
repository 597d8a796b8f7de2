//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! mesh.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → MeshConfig (validated, immutable)
//!     → each component takes the section it needs
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the process config is not hot-reloaded
//!   (served application config lives in `config_store` and is)
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_or_default, parse_config, ConfigError};
pub use schema::{
    GatewayConfig, InstanceConfig, MeshConfig, PolicyConfig, RegistryConfig, ResilienceConfig,
    RewriteConfig, RouteConfig,
};
