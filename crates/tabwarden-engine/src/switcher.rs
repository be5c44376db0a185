//! Workspace switching: archives the outgoing workspace's live state, tears
//! the live layer down to the anchor surface, and rematerializes the target's
//! persisted records with the original window topology.
//!
//! Windows rebuild in ascending original-window order with the anchor window
//! filling the first slot; tabs within a window are created in ascending
//! recorded index order. Individual creation failures are logged and skipped,
//! a partial restoration beats aborting the whole switch.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, warn};

use tabwarden_db::tab_group_repository::{GroupLiveFields, TabGroup, TabGroupRepository};
use tabwarden_db::tab_repository::{Tab, TabLiveFields, TabRepository};
use tabwarden_db::workspace_repository::WorkspaceRepository;
use tabwarden_db::ItemStatus;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::host::{CreateTab, GroupUpdate};

/// Counts from one workspace activation or close.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwitchReport {
    /// Outgoing records marked archived.
    pub archived: usize,
    /// Live tabs closed during teardown.
    pub closed: usize,
    pub windows_created: usize,
    pub tabs_created: usize,
    pub groups_created: usize,
    /// Records whose live item could not be created.
    pub failed_tabs: usize,
}

impl Engine {
    /// Deactivate whatever is active and materialize `target_workspace_id`.
    ///
    /// With `skip_rematerialize` the store is not replayed into the live
    /// layer; only live tabs not backed by one of the target's active records
    /// are closed. Callers use that when the target's records already point
    /// at the current live tabs, e.g. a workspace just built from them.
    pub async fn activate_workspace(
        &self,
        target_workspace_id: i64,
        skip_rematerialize: bool,
    ) -> Result<SwitchReport, EngineError> {
        let workspaces = WorkspaceRepository::new(&self.store);
        let target = workspaces.get(target_workspace_id)?;
        let current = workspaces.active_workspace()?;
        let mut report = SwitchReport::default();

        if let Some(current) = &current {
            if current.id == target.id && !skip_rematerialize {
                debug!(workspace_id = target.id, "workspace already active");
                return Ok(report);
            }
        }

        // Archive the outgoing workspace's live state, dropping the archived
        // generation left over from its previous deactivation first.
        let tabs = TabRepository::new(&self.store);
        if let Some(current) = &current {
            if current.id != target.id {
                let stale = tabs.delete_archived_for_workspace(current.id)?;
                if stale > 0 {
                    debug!(
                        workspace_id = current.id,
                        stale, "dropped stale archived records"
                    );
                }
                report.archived = tabs.archive_workspace_tabs(current.id)?;
            }
        }

        workspaces.set_active_exclusive(target.id)?;

        if skip_rematerialize {
            report.closed = self.close_unbacked_live_tabs(target.id).await?;
            debug!(
                workspace_id = target.id,
                closed = report.closed,
                "activated without rematerializing"
            );
            return Ok(report);
        }

        report.closed = self.teardown_live_tabs().await?;
        self.rematerialize_workspace(target.id, &mut report).await?;
        debug!(
            workspace_id = target.id,
            archived = report.archived,
            closed = report.closed,
            windows = report.windows_created,
            tabs = report.tabs_created,
            groups = report.groups_created,
            failed = report.failed_tabs,
            "workspace activated"
        );
        Ok(report)
    }

    /// Deactivate the active workspace without materializing another one.
    /// The live layer is torn down to the anchor surface and the unassigned
    /// context becomes the target. A call with nothing active is a no-op.
    pub async fn close_active_workspace(&self) -> Result<SwitchReport, EngineError> {
        let workspaces = WorkspaceRepository::new(&self.store);
        let current = match workspaces.active_workspace()? {
            Some(workspace) => workspace,
            None => {
                debug!("no active workspace to close");
                return Ok(SwitchReport::default());
            }
        };

        let tabs = TabRepository::new(&self.store);
        let mut report = SwitchReport::default();
        let stale = tabs.delete_archived_for_workspace(current.id)?;
        if stale > 0 {
            debug!(
                workspace_id = current.id,
                stale, "dropped stale archived records"
            );
        }
        report.archived = tabs.archive_workspace_tabs(current.id)?;
        workspaces.clear_active()?;
        report.closed = self.teardown_live_tabs().await?;

        if let Some(window_id) = self.anchor_window_id().await? {
            if let Err(err) = self.host.focus_window(window_id).await {
                warn!(window_id, error = %err, "focusing anchor window failed");
            }
        }
        debug!(
            workspace_id = current.id,
            archived = report.archived,
            closed = report.closed,
            "workspace closed"
        );
        Ok(report)
    }

    /// Close every live tab except the anchor surface. Enumeration happens
    /// immediately before the close so vanished items are not acted on.
    pub(crate) async fn teardown_live_tabs(&self) -> Result<usize, EngineError> {
        let live = self.host.list_tabs().await?;
        let doomed: Vec<i64> = live
            .iter()
            .filter(|tab| !self.is_anchor_url(&tab.url))
            .map(|tab| tab.id)
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }
        self.host.close_tabs(&doomed).await?;
        Ok(doomed.len())
    }

    /// The window currently holding the anchor surface, if any.
    pub(crate) async fn anchor_window_id(&self) -> Result<Option<i64>, EngineError> {
        let live = self.host.list_tabs().await?;
        Ok(live
            .iter()
            .find(|tab| self.is_anchor_url(&tab.url))
            .map(|tab| tab.window_id))
    }

    async fn close_unbacked_live_tabs(&self, workspace_id: i64) -> Result<usize, EngineError> {
        let tabs = TabRepository::new(&self.store);
        let backed: HashSet<i64> = tabs
            .list_by_status(workspace_id, ItemStatus::Active)?
            .iter()
            .filter_map(|record| record.external_id)
            .collect();
        let live = self.host.list_tabs().await?;
        let doomed: Vec<i64> = live
            .iter()
            .filter(|tab| !self.is_anchor_url(&tab.url) && !backed.contains(&tab.id))
            .map(|tab| tab.id)
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }
        self.host.close_tabs(&doomed).await?;
        Ok(doomed.len())
    }

    /// Replay the workspace's persisted records into the live layer. Records
    /// partition by their recorded window id; the first partition reuses the
    /// anchor window when one exists. Old external ids are remapped to the
    /// newly created ones so groups reattach to the right members.
    async fn rematerialize_workspace(
        &self,
        workspace_id: i64,
        report: &mut SwitchReport,
    ) -> Result<(), EngineError> {
        let tabs = TabRepository::new(&self.store);
        let groups = TabGroupRepository::new(&self.store);

        let records = tabs.list_for_workspace(workspace_id)?;
        let group_records = groups.list_for_workspace(workspace_id)?;

        // list_for_workspace returns window-then-index order, so each
        // partition arrives already sorted by recorded index.
        let mut partitions: BTreeMap<i64, Vec<&Tab>> = BTreeMap::new();
        for record in &records {
            if record.url.is_empty() {
                continue;
            }
            partitions.entry(record.window_id).or_default().push(record);
        }

        let mut groups_by_external: HashMap<i64, &TabGroup> = HashMap::new();
        for group in &group_records {
            if let Some(external_id) = group.external_id {
                groups_by_external.insert(external_id, group);
            }
        }

        let anchor_window = self.anchor_window_id().await?;
        let mut reusable_window = anchor_window;
        let mut first_created_window: Option<i64> = None;

        for (original_window, partition) in &partitions {
            let live_window_id = match reusable_window.take() {
                Some(window_id) => window_id,
                None => match self.host.create_window(false).await {
                    Ok(window) => {
                        report.windows_created += 1;
                        if first_created_window.is_none() {
                            first_created_window = Some(window.id);
                        }
                        window.id
                    }
                    Err(err) => {
                        warn!(
                            original_window,
                            error = %err,
                            "window creation failed, skipping partition"
                        );
                        report.failed_tabs += partition.len();
                        continue;
                    }
                },
            };

            // Old group external id -> (new member ids, member stable ids).
            let mut group_members: BTreeMap<i64, (Vec<i64>, Vec<String>)> = BTreeMap::new();
            let mut position: i64 = 0;
            for record in partition {
                let request = CreateTab {
                    window_id: live_window_id,
                    url: record.url.clone(),
                    index: None,
                    pinned: record.pinned,
                    active: false,
                };
                let live = match self.host.create_tab(request).await {
                    Ok(live) => live,
                    Err(err) => {
                        warn!(
                            stable_id = %record.stable_id,
                            url = %record.url,
                            error = %err,
                            "tab creation failed"
                        );
                        report.failed_tabs += 1;
                        continue;
                    }
                };
                let fields = TabLiveFields {
                    external_id: Some(live.id),
                    window_id: live_window_id,
                    group_id: None,
                    tab_index: position,
                    url: record.url.clone(),
                    title: record.title.clone(),
                    pinned: record.pinned,
                };
                if let Err(err) = tabs.materialize(&record.stable_id, &fields) {
                    warn!(stable_id = %record.stable_id, error = %err, "materialize update failed");
                }
                if let Some(old_group_id) = record.group_id {
                    let entry = group_members.entry(old_group_id).or_default();
                    entry.0.push(live.id);
                    entry.1.push(record.stable_id.clone());
                }
                report.tabs_created += 1;
                position += 1;
            }

            for (old_group_id, (member_ids, member_stable_ids)) in group_members {
                let record = match groups_by_external.get(&old_group_id) {
                    Some(record) => *record,
                    None => {
                        debug!(old_group_id, "members reference an untracked group, left ungrouped");
                        continue;
                    }
                };
                let new_group_id = match self.host.group_tabs(live_window_id, &member_ids).await {
                    Ok(group_id) => group_id,
                    Err(err) => {
                        warn!(stable_id = %record.stable_id, error = %err, "group creation failed");
                        continue;
                    }
                };
                let update = GroupUpdate {
                    title: Some(record.title.clone()),
                    color: Some(record.color.clone()),
                    collapsed: Some(record.collapsed),
                };
                if let Err(err) = self.host.update_group(new_group_id, update).await {
                    warn!(group_id = new_group_id, error = %err, "group metadata update failed");
                }
                let fields = GroupLiveFields {
                    external_id: Some(new_group_id),
                    window_id: live_window_id,
                    title: record.title.clone(),
                    color: record.color.clone(),
                    collapsed: record.collapsed,
                };
                if let Err(err) = groups.materialize(&record.stable_id, &fields) {
                    warn!(stable_id = %record.stable_id, error = %err, "group materialize update failed");
                }
                if let Err(err) = tabs.set_group_many(&member_stable_ids, Some(new_group_id)) {
                    warn!(group_id = new_group_id, error = %err, "pointing members at new group failed");
                }
                report.groups_created += 1;
            }
        }

        let focus_target = anchor_window.or(first_created_window);
        if let Some(window_id) = focus_target {
            if let Err(err) = self.host.focus_window(window_id).await {
                warn!(window_id, error = %err, "focusing window failed");
            }
        }
        Ok(())
    }
}
