//! Snapshot engine: captures immutable point-in-time copies of a workspace's
//! active tabs and groups, and restores them in replace or append mode.
//!
//! Restored records are copies, not the original identities: every restore
//! inserts fresh records with new stable ids pointing at the newly created
//! live items.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, warn};

use tabwarden_db::snapshot_repository::{
    NewSnapshotGroup, NewSnapshotTab, SnapshotRepository, SnapshotTab, SnapshotTabGroup,
};
use tabwarden_db::tab_group_repository::{NewTabGroup, TabGroupRepository};
use tabwarden_db::tab_repository::{NewTab, TabRepository};
use tabwarden_db::{ItemStatus, SnapshotReason};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::host::{CreateTab, GroupUpdate};

/// How restored items relate to whatever is currently live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreMode {
    /// Archive the workspace's current active state first, then rebuild the
    /// live layer from the snapshot alone.
    Replace,
    /// Materialize the snapshot into new windows alongside the current state.
    Append,
}

impl RestoreMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RestoreMode::Replace => "replace",
            RestoreMode::Append => "append",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "replace" => Ok(RestoreMode::Replace),
            "append" => Ok(RestoreMode::Append),
            _ => Err(format!("invalid restore mode: {value}")),
        }
    }
}

/// Counts from one snapshot restoration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub windows_created: usize,
    pub tabs_created: usize,
    pub groups_created: usize,
    pub failed_tabs: usize,
}

impl Engine {
    /// Capture the workspace's active tabs and groups as one snapshot row
    /// plus child rows, written in a single transaction. Defaults to the
    /// current target workspace. A workspace with zero active tabs has
    /// nothing to capture and fails validation.
    pub fn create_snapshot(
        &self,
        workspace_id: Option<i64>,
        reason: SnapshotReason,
    ) -> Result<i64, EngineError> {
        let workspace_id = match workspace_id {
            Some(id) => id,
            None => self.target_workspace_id()?,
        };
        let tabs = TabRepository::new(&self.store);
        let groups = TabGroupRepository::new(&self.store);

        let active_tabs = tabs.list_by_status(workspace_id, ItemStatus::Active)?;
        if active_tabs.is_empty() {
            return Err(EngineError::Validation(format!(
                "workspace {workspace_id} has no active tabs to snapshot"
            )));
        }
        let active_groups = groups.list_by_status(workspace_id, ItemStatus::Active)?;

        // Live window ids are meaningless after a restore. Snapshot rows
        // carry a stable ordinal over the distinct window ids, ascending.
        let distinct_windows: BTreeSet<i64> =
            active_tabs.iter().map(|tab| tab.window_id).collect();
        let window_ordinal: HashMap<i64, i64> = distinct_windows
            .iter()
            .enumerate()
            .map(|(ordinal, &window_id)| (window_id, ordinal as i64))
            .collect();
        let group_stable_by_external: HashMap<i64, &str> = active_groups
            .iter()
            .filter_map(|group| {
                group
                    .external_id
                    .map(|external_id| (external_id, group.stable_id.as_str()))
            })
            .collect();

        let snapshot_tabs: Vec<NewSnapshotTab> = active_tabs
            .iter()
            .map(|tab| NewSnapshotTab {
                window_index: window_ordinal[&tab.window_id],
                group_stable_id: tab.group_id.and_then(|group_id| {
                    group_stable_by_external
                        .get(&group_id)
                        .map(|stable_id| stable_id.to_string())
                }),
                tab_index: tab.tab_index,
                url: tab.url.clone(),
                title: tab.title.clone(),
                pinned: tab.pinned,
            })
            .collect();
        let snapshot_groups: Vec<NewSnapshotGroup> = active_groups
            .iter()
            .map(|group| NewSnapshotGroup {
                stable_id: group.stable_id.clone(),
                title: group.title.clone(),
                color: group.color.clone(),
                collapsed: group.collapsed,
            })
            .collect();

        let snapshots = SnapshotRepository::new(&self.store);
        let snapshot_id =
            snapshots.create(workspace_id, reason, &snapshot_tabs, &snapshot_groups)?;
        debug!(
            snapshot_id,
            workspace_id,
            reason = %reason,
            tabs = snapshot_tabs.len(),
            groups = snapshot_groups.len(),
            "snapshot captured"
        );
        Ok(snapshot_id)
    }

    pub fn delete_snapshot(&self, snapshot_id: i64) -> Result<(), EngineError> {
        let snapshots = SnapshotRepository::new(&self.store);
        snapshots.delete(snapshot_id)?;
        debug!(snapshot_id, "snapshot deleted");
        Ok(())
    }

    /// Materialize a snapshot back into the live layer.
    ///
    /// Restoration writes live items, so the snapshot's owning workspace must
    /// be the current target; restoring a foreign workspace's snapshot would
    /// splice its tabs into whatever is active now.
    pub async fn restore_snapshot(
        &self,
        snapshot_id: i64,
        mode: RestoreMode,
    ) -> Result<RestoreReport, EngineError> {
        let snapshots = SnapshotRepository::new(&self.store);
        let snapshot = snapshots.get(snapshot_id)?;
        let workspace_id = snapshot.workspace_id;

        let target = self.target_workspace_id()?;
        if workspace_id != target {
            return Err(EngineError::Validation(format!(
                "snapshot {snapshot_id} belongs to workspace {workspace_id}, \
                 which is not currently active"
            )));
        }

        let snapshot_tabs = snapshots.tabs_for(snapshot_id)?;
        let snapshot_groups = snapshots.groups_for(snapshot_id)?;

        let tabs = TabRepository::new(&self.store);
        let groups = TabGroupRepository::new(&self.store);
        let mut report = RestoreReport::default();

        if mode == RestoreMode::Replace {
            // Same deactivation step the workspace switcher performs, plus
            // dropping the superseded group records: restored groups arrive
            // as fresh records, so the old ones would linger forever.
            let stale = tabs.delete_archived_for_workspace(workspace_id)?;
            if stale > 0 {
                debug!(workspace_id, stale, "dropped stale archived records");
            }
            let archived = tabs.archive_workspace_tabs(workspace_id)?;
            if archived > 0 {
                debug!(workspace_id, archived, "archived records replaced by restore");
            }
            let dropped_groups = groups.delete_active_for_workspace(workspace_id)?;
            if dropped_groups > 0 {
                debug!(workspace_id, dropped_groups, "dropped group records replaced by restore");
            }
            let closed = self.teardown_live_tabs().await?;
            if closed > 0 {
                debug!(closed, "closed live tabs before restore");
            }
        }

        // tabs_for returns window-then-index order, so each partition is
        // already in recorded order.
        let mut partitions: BTreeMap<i64, Vec<&SnapshotTab>> = BTreeMap::new();
        for row in &snapshot_tabs {
            if row.url.is_empty() {
                continue;
            }
            partitions.entry(row.window_index).or_default().push(row);
        }
        let groups_by_stable: HashMap<&str, &SnapshotTabGroup> = snapshot_groups
            .iter()
            .map(|group| (group.stable_id.as_str(), group))
            .collect();

        // Replace mode rebuilds into the anchor window first; append mode
        // always opens new windows next to the current layout.
        let mut reusable_window = match mode {
            RestoreMode::Replace => self.anchor_window_id().await?,
            RestoreMode::Append => None,
        };

        for (&window_index, partition) in &partitions {
            let live_window_id = match reusable_window.take() {
                Some(window_id) => window_id,
                None => match self.host.create_window(false).await {
                    Ok(window) => {
                        report.windows_created += 1;
                        window.id
                    }
                    Err(err) => {
                        warn!(
                            window_index,
                            error = %err,
                            "window creation failed, skipping partition"
                        );
                        report.failed_tabs += partition.len();
                        continue;
                    }
                },
            };

            // Snapshot group stable id -> (new live ids, new record ids).
            let mut group_members: BTreeMap<&str, (Vec<i64>, Vec<String>)> = BTreeMap::new();
            let mut position: i64 = 0;
            for row in partition {
                let request = CreateTab {
                    window_id: live_window_id,
                    url: row.url.clone(),
                    index: None,
                    pinned: row.pinned,
                    active: false,
                };
                let live = match self.host.create_tab(request).await {
                    Ok(live) => live,
                    Err(err) => {
                        warn!(url = %row.url, error = %err, "tab creation failed");
                        report.failed_tabs += 1;
                        continue;
                    }
                };
                let new = NewTab {
                    external_id: Some(live.id),
                    window_id: live_window_id,
                    group_id: None,
                    workspace_id,
                    tab_index: position,
                    url: row.url.clone(),
                    title: row.title.clone(),
                    pinned: row.pinned,
                };
                let record = match tabs.insert(new) {
                    Ok(record) => record,
                    Err(err) => {
                        warn!(url = %row.url, error = %err, "restored record insert failed");
                        continue;
                    }
                };
                if let Some(group_stable_id) = &row.group_stable_id {
                    let entry = group_members.entry(group_stable_id.as_str()).or_default();
                    entry.0.push(live.id);
                    entry.1.push(record.stable_id.clone());
                }
                report.tabs_created += 1;
                position += 1;
            }

            for (snapshot_stable_id, (member_ids, member_stable_ids)) in group_members {
                let row = match groups_by_stable.get(snapshot_stable_id) {
                    Some(row) => *row,
                    None => {
                        debug!(
                            snapshot_stable_id,
                            "members reference a group missing from the snapshot, left ungrouped"
                        );
                        continue;
                    }
                };
                let new_group_id = match self.host.group_tabs(live_window_id, &member_ids).await {
                    Ok(group_id) => group_id,
                    Err(err) => {
                        warn!(title = %row.title, error = %err, "group creation failed");
                        continue;
                    }
                };
                let update = GroupUpdate {
                    title: Some(row.title.clone()),
                    color: Some(row.color.clone()),
                    collapsed: Some(row.collapsed),
                };
                if let Err(err) = self.host.update_group(new_group_id, update).await {
                    warn!(group_id = new_group_id, error = %err, "group metadata update failed");
                }
                let new_group = NewTabGroup {
                    external_id: Some(new_group_id),
                    window_id: live_window_id,
                    workspace_id,
                    title: row.title.clone(),
                    color: row.color.clone(),
                    collapsed: row.collapsed,
                };
                match groups.insert(new_group) {
                    Ok(record) => {
                        if let Err(err) =
                            tabs.set_group_many(&member_stable_ids, Some(new_group_id))
                        {
                            warn!(
                                stable_id = %record.stable_id,
                                error = %err,
                                "pointing members at restored group failed"
                            );
                        }
                        report.groups_created += 1;
                    }
                    Err(err) => {
                        warn!(title = %row.title, error = %err, "restored group insert failed");
                    }
                }
            }
        }

        debug!(
            snapshot_id,
            workspace_id,
            mode = mode.as_str(),
            windows = report.windows_created,
            tabs = report.tabs_created,
            groups = report.groups_created,
            failed = report.failed_tabs,
            "snapshot restored"
        );
        Ok(report)
    }
}
