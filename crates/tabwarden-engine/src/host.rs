//! Live environment abstraction, the engine's only view of the host.
//!
//! Implementations can speak to a real host over whatever transport it
//! exposes, or be mocked for testing. The engine never talks to the host
//! except through this trait, and never treats live ids as durable.

use async_trait::async_trait;

use crate::error::HostError;

/// A tab as the host reports it. `id` is transient and owned by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveTab {
    pub id: i64,
    pub window_id: i64,
    pub group_id: Option<i64>,
    pub index: i64,
    pub url: String,
    pub title: String,
    pub pinned: bool,
    pub active: bool,
}

/// A tab group as the host reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveGroup {
    pub id: i64,
    pub window_id: i64,
    pub title: String,
    pub color: String,
    pub collapsed: bool,
}

/// A top-level window as the host reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveWindow {
    pub id: i64,
    pub focused: bool,
}

/// Request to open a tab in an existing window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTab {
    pub window_id: i64,
    pub url: String,
    pub index: Option<i64>,
    pub pinned: bool,
    pub active: bool,
}

/// Partial update of a live group's presentation fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupUpdate {
    pub title: Option<String>,
    pub color: Option<String>,
    pub collapsed: Option<bool>,
}

/// The live environment interface.
///
/// Enumeration methods return the complete current state; mutation methods
/// act on live ids and fail with `HostError::MissingItem` when the target
/// has already disappeared.
#[async_trait]
pub trait HostClient: Send + Sync {
    /// Enumerate every open tab across all windows.
    async fn list_tabs(&self) -> Result<Vec<LiveTab>, HostError>;

    /// Enumerate every tab group across all windows.
    async fn list_groups(&self) -> Result<Vec<LiveGroup>, HostError>;

    /// Enumerate every top-level window.
    async fn list_windows(&self) -> Result<Vec<LiveWindow>, HostError>;

    /// Open a tab. The window must exist.
    async fn create_tab(&self, request: CreateTab) -> Result<LiveTab, HostError>;

    /// Close tabs by live id. Ids that no longer exist are skipped.
    async fn close_tabs(&self, tab_ids: &[i64]) -> Result<(), HostError>;

    /// Move a tab to a position within its window.
    async fn move_tab(&self, tab_id: i64, index: i64) -> Result<(), HostError>;

    /// Put tabs into a new group in `window_id`; returns the new group's
    /// live id.
    async fn group_tabs(&self, window_id: i64, tab_ids: &[i64]) -> Result<i64, HostError>;

    /// Update a group's presentation fields.
    async fn update_group(&self, group_id: i64, update: GroupUpdate) -> Result<(), HostError>;

    /// Remove tabs from whatever group they are in.
    async fn ungroup_tabs(&self, tab_ids: &[i64]) -> Result<(), HostError>;

    /// Open a new empty window.
    async fn create_window(&self, focused: bool) -> Result<LiveWindow, HostError>;

    /// Look up a single window by live id.
    async fn get_window(&self, window_id: i64) -> Result<LiveWindow, HostError>;

    /// Bring a window to the foreground.
    async fn focus_window(&self, window_id: i64) -> Result<(), HostError>;
}
