//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (ordered route lookup)
//!     → matcher.rs (evaluate path pattern)
//!     → rewrite.rs (optional path rewrite)
//!     → Return: RouteMatch { service, forward_path } or no match
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Compile patterns and rewrites
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path
//! - Deterministic: same input always matches same route
//! - First match wins (declaration order)

pub mod matcher;
pub mod rewrite;
pub mod router;

pub use matcher::PathPattern;
pub use rewrite::PathRewrite;
pub use router::{Route, RouteMatch, Router};
