//! tabwarden-engine: reconciliation, workspace switching, and snapshot
//! engine for Tabwarden.
//!
//! The engine keeps a persisted mirror (tabwarden-db) consistent with an
//! external tab/window host it does not own, reached only through the
//! `HostClient` trait:
//! - `Reconciler`: converges stored records against live enumeration
//! - `Tab Group Synchronizer`: consumes live group lifecycle events
//! - `Workspace Switcher`: teardown/rematerialization on activation
//! - `Snapshot Engine`: point-in-time capture and restore
//! - `Cleaning` and organize passes over the shared archival lifecycle
//!
//! `dispatch` exposes the whole surface as a typed JSON request/response
//! contract for an external UI layer.

pub mod cleaning;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod groups;
pub mod host;
pub mod mock;
pub mod organize;
pub mod reconcile;
pub mod snapshot;
pub mod switcher;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, HostError};
pub use host::HostClient;

/// Stable crate label used for bootstrap smoke tests.
pub fn crate_label() -> &'static str {
    "tabwarden-engine"
}
