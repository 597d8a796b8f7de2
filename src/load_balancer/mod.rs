//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Service resolved → UP instances from discovery
//!     → pool.rs (balancer for the service name)
//!     → round_robin.rs (rotate through instances)
//!     → chosen instance, or None when the list is empty
//! ```
//!
//! # Design Decisions
//! - Balancers hold only a counter; the instance list is supplied on every
//!   call so topology changes take effect immediately
//! - One counter per service name

pub mod pool;
pub mod round_robin;

use crate::registry::Instance;

pub use pool::BalancerPool;
pub use round_robin::RoundRobin;

/// Strategy for picking one instance out of a candidate list.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    fn next_instance<'a>(&self, instances: &'a [Instance]) -> Option<&'a Instance>;
}
