//! Discovery registry subsystem.
//!
//! # Data Flow
//! ```text
//! Service Instance
//!     → client.rs (HTTP) → api.rs → store.rs (register / heartbeat / deregister)
//!
//! eviction.rs (periodic timer)
//!     → store.rs evict_expired(now)
//!
//! Gateway / peer clients
//!     → discovery.rs (Discovery trait, cached + stale-tolerant)
//!     → store.rs (in-process) or client.rs (remote)
//! ```
//!
//! # Design Decisions
//! - Single authoritative registry node, no replication
//! - Eventually consistent: expired leases linger until the next sweep
//! - Only UP instances are visible to lookups

pub mod api;
pub mod client;
pub mod discovery;
pub mod eviction;
pub mod instance;
pub mod store;

pub use client::RegistryClient;
pub use discovery::{CachedDiscovery, Discovery};
pub use eviction::EvictionTask;
pub use instance::{Instance, InstanceStatus, Lease, ServiceSummary};
pub use store::Registry;
