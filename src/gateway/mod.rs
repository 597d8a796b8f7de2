//! API gateway.
//!
//! # Data Flow
//! ```text
//! Client request
//!     → server.rs (request ID, trace span)
//!     → routing (first matching route, optional rewrite)
//!     → discovery (UP instances) → load_balancer (round-robin)
//!     → resilience policy of the route, if any
//!     → forward.rs (upstream request, header hygiene)
//!     → response, or 404 / 502 / 503 / 504
//! ```

pub mod forward;
pub mod server;

pub use server::GatewayServer;
