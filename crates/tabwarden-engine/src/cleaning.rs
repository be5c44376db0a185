//! Cleaning passes: archival sweeps over a workspace's active tabs.
//!
//! Every pass shares one shape: query active records, pick a candidate
//! subset with a pure predicate, close the candidates' live items
//! best-effort, then archive the records in one bulk update. Pinned tabs and
//! the anchor surface are never candidates, and re-running a pass with no
//! new candidates is a no-op.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use tabwarden_db::resource_repository::ResourceRepository;
use tabwarden_db::tab_repository::{Tab, TabRepository};
use tabwarden_db::workspace_repository::WorkspaceRepository;
use tabwarden_db::{now_ms, ItemStatus};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::reconcile::keeper_first;

/// Counts from one cleaning pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanReport {
    /// Active records inspected.
    pub examined: usize,
    /// Live tabs actually closed.
    pub closed: usize,
    /// Records archived.
    pub archived: usize,
}

impl Engine {
    /// Archive tabs untouched for longer than the day threshold (the
    /// configured default, or the caller's override).
    pub async fn clean_unused_tabs(
        &self,
        workspace_id: i64,
        days_threshold: Option<i64>,
    ) -> Result<CleanReport, EngineError> {
        if let Some(days) = days_threshold {
            if days < 1 {
                return Err(EngineError::Validation(format!(
                    "day threshold must be at least 1, got {days}"
                )));
            }
        }
        let cutoff = self.config.unused_cutoff_ms(now_ms(), days_threshold);

        let active = self.active_tabs(workspace_id)?;
        let candidates: Vec<&Tab> = active
            .iter()
            .filter(|tab| self.cleanable(tab) && tab.updated_at < cutoff)
            .collect();
        self.close_and_archive(workspace_id, active.len(), &candidates, "unused")
            .await
    }

    /// Archive all but one record per duplicated URL, keeping the most
    /// recently updated (ties go to the lowest stable id).
    pub async fn clean_duplicate_tabs(
        &self,
        workspace_id: i64,
    ) -> Result<CleanReport, EngineError> {
        let active = self.active_tabs(workspace_id)?;

        let mut by_url: HashMap<&str, Vec<&Tab>> = HashMap::new();
        for tab in active.iter().filter(|tab| self.cleanable(tab)) {
            if tab.url.is_empty() {
                continue;
            }
            by_url.entry(tab.url.as_str()).or_default().push(tab);
        }
        let mut candidates: Vec<&Tab> = Vec::new();
        for (_, mut tabs) in by_url {
            if tabs.len() < 2 {
                continue;
            }
            tabs.sort_by(|a, b| keeper_first(a, b));
            candidates.extend(tabs.into_iter().skip(1));
        }
        self.close_and_archive(workspace_id, active.len(), &candidates, "duplicate")
            .await
    }

    /// Archive tabs whose URL is already saved in one of the workspace's
    /// resource groups.
    pub async fn clean_resource_tabs(&self, workspace_id: i64) -> Result<CleanReport, EngineError> {
        let resource_urls = self.resource_urls(workspace_id)?;
        let active = self.active_tabs(workspace_id)?;
        let candidates: Vec<&Tab> = active
            .iter()
            .filter(|tab| self.cleanable(tab) && resource_urls.contains(&tab.url))
            .collect();
        self.close_and_archive(workspace_id, active.len(), &candidates, "resource")
            .await
    }

    /// Archive tabs whose URL is not saved in any of the workspace's
    /// resource groups.
    pub async fn clean_non_resource_tabs(
        &self,
        workspace_id: i64,
    ) -> Result<CleanReport, EngineError> {
        let resource_urls = self.resource_urls(workspace_id)?;
        let active = self.active_tabs(workspace_id)?;
        let candidates: Vec<&Tab> = active
            .iter()
            .filter(|tab| self.cleanable(tab) && !resource_urls.contains(&tab.url))
            .collect();
        self.close_and_archive(workspace_id, active.len(), &candidates, "non-resource")
            .await
    }

    fn active_tabs(&self, workspace_id: i64) -> Result<Vec<Tab>, EngineError> {
        let tabs = TabRepository::new(&self.store);
        Ok(tabs.list_by_status(workspace_id, ItemStatus::Active)?)
    }

    /// Pinned tabs and the anchor surface are exempt from every pass.
    fn cleanable(&self, tab: &Tab) -> bool {
        !tab.pinned && !self.is_anchor_url(&tab.url)
    }

    fn resource_urls(&self, workspace_id: i64) -> Result<HashSet<String>, EngineError> {
        let workspaces = WorkspaceRepository::new(&self.store);
        let workspace = workspaces.get(workspace_id)?;
        let resources = ResourceRepository::new(&self.store);
        let urls = resources.list_urls_for_groups(&workspace.resource_group_ids)?;
        Ok(urls.into_iter().collect())
    }

    /// Close the candidates' live items and archive their records. Live
    /// existence is re-queried immediately before the close so items gone
    /// since the caller's enumeration are skipped, not errored on.
    async fn close_and_archive(
        &self,
        workspace_id: i64,
        examined: usize,
        candidates: &[&Tab],
        pass: &str,
    ) -> Result<CleanReport, EngineError> {
        let mut report = CleanReport {
            examined,
            ..CleanReport::default()
        };
        if candidates.is_empty() {
            return Ok(report);
        }

        let live_ids: HashSet<i64> = self
            .host
            .list_tabs()
            .await?
            .iter()
            .map(|tab| tab.id)
            .collect();
        let closable: Vec<i64> = candidates
            .iter()
            .filter_map(|tab| tab.external_id)
            .filter(|id| live_ids.contains(id))
            .collect();
        if !closable.is_empty() {
            match self.host.close_tabs(&closable).await {
                Ok(()) => report.closed = closable.len(),
                Err(err) => warn!(pass, error = %err, "closing candidate tabs failed"),
            }
        }

        let stable_ids: Vec<String> = candidates
            .iter()
            .map(|tab| tab.stable_id.clone())
            .collect();
        let tabs = TabRepository::new(&self.store);
        report.archived = tabs.archive_many(&stable_ids)?;
        debug!(
            pass,
            workspace_id,
            examined = report.examined,
            closed = report.closed,
            archived = report.archived,
            "cleaning pass complete"
        );
        Ok(report)
    }
}
