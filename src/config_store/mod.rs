//! Config distribution subsystem.
//!
//! # Data Flow
//! ```text
//! Source of truth (directory of TOML files, or PUT commits)
//!     → source.rs (parse & flatten)
//!     → repository.rs (versioned sources, merge on fetch)
//!     → api.rs (GET /{application}/{profile})
//!     → client.rs (snapshot cache, refresh, fallback defaults)
//!
//! watcher.rs (file change)
//!     → repository.rs load_dir → new versions visible to the next fetch
//! ```

pub mod api;
pub mod client;
pub mod repository;
pub mod source;
pub mod watcher;

pub use client::{ConfigClient, ConfigSnapshot, SnapshotSource};
pub use repository::{ConfigDocument, ConfigRepository};
pub use source::Properties;
pub use watcher::RepositoryWatcher;
