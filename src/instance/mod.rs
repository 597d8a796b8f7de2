//! Service instance runtime: the pieces every mesh member needs around its own API.
//!
//! # Data Flow
//! ```text
//! service.rs   → config fetch, register, serve, deregister
//! heartbeat.rs → periodic lease renewal, re-registration
//! peer.rs      → discovery + round-robin + resilience for outbound calls
//! ```

pub mod heartbeat;
pub mod peer;
pub mod service;

pub use heartbeat::HeartbeatTask;
pub use peer::{PeerClient, PeerRequest, PeerResponse};
pub use service::ServiceInstance;
