//! Tab group synchronization: mirrors live group lifecycle notifications onto
//! persisted records, and runs the full-set sweep at startup.
//!
//! Events arrive on a single-consumer channel (see `Engine::run_group_events`)
//! so update and removal handling never overlap.

use std::collections::HashSet;

use tracing::{debug, warn};

use tabwarden_db::tab_group_repository::{GroupLiveFields, NewTabGroup, TabGroupRepository};
use tabwarden_db::tab_repository::TabRepository;
use tabwarden_db::ItemStatus;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::host::LiveGroup;

/// A live group lifecycle notification, as fed into the synchronizer loop.
#[derive(Debug, Clone)]
pub enum GroupEvent {
    Created(LiveGroup),
    /// Covers title/color/collapsed changes and window moves.
    Updated(LiveGroup),
    Removed {
        group_id: i64,
    },
}

/// Counts from the startup sweep over all live groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupSyncReport {
    pub updated: usize,
    pub created: usize,
    pub archived: usize,
}

enum UpsertOutcome {
    Updated,
    Created,
    Unchanged,
}

impl Engine {
    pub async fn handle_group_event(&self, event: GroupEvent) -> Result<(), EngineError> {
        match event {
            // A create and an update land in the same place: an update with no
            // matching record is treated as a create.
            GroupEvent::Created(live) | GroupEvent::Updated(live) => {
                self.upsert_live_group(&live)?;
                Ok(())
            }
            GroupEvent::Removed { group_id } => self.handle_group_removed(group_id).await,
        }
    }

    /// One sweep over the full live group enumeration against the full
    /// persisted active set. Records for groups no longer live are archived
    /// and their member tabs unset to ungrouped.
    pub async fn sync_groups_at_startup(&self) -> Result<GroupSyncReport, EngineError> {
        let live = self.host.list_groups().await?;
        let mut report = GroupSyncReport::default();

        for group in &live {
            match self.upsert_live_group(group) {
                Ok(UpsertOutcome::Updated) => report.updated += 1,
                Ok(UpsertOutcome::Created) => report.created += 1,
                Ok(UpsertOutcome::Unchanged) => {}
                Err(err) => warn!(group_id = group.id, error = %err, "startup group upsert failed"),
            }
        }

        let live_ids: HashSet<i64> = live.iter().map(|group| group.id).collect();
        let groups = TabGroupRepository::new(&self.store);
        let tabs = TabRepository::new(&self.store);
        for record in groups.list_active()? {
            if record
                .external_id
                .is_some_and(|external_id| live_ids.contains(&external_id))
            {
                continue;
            }
            if let Err(err) = groups.archive(&record.stable_id) {
                warn!(stable_id = %record.stable_id, error = %err, "startup group archive failed");
                continue;
            }
            report.archived += 1;
            if let Some(external_id) = record.external_id {
                match tabs.clear_group_references(record.workspace_id, external_id) {
                    Ok(cleared) => {
                        if cleared > 0 {
                            debug!(
                                stable_id = %record.stable_id,
                                cleared,
                                "unset group references on member tabs"
                            );
                        }
                    }
                    Err(err) => {
                        warn!(stable_id = %record.stable_id, error = %err, "clearing group references failed");
                    }
                }
            }
        }

        Ok(report)
    }

    fn upsert_live_group(&self, live: &LiveGroup) -> Result<UpsertOutcome, EngineError> {
        let groups = TabGroupRepository::new(&self.store);
        let fields = GroupLiveFields {
            external_id: Some(live.id),
            window_id: live.window_id,
            title: live.title.clone(),
            color: live.color.clone(),
            collapsed: live.collapsed,
        };
        match groups.find_active_by_external(live.id)? {
            Some(record) => {
                if !record.differs_from(&fields) {
                    return Ok(UpsertOutcome::Unchanged);
                }
                groups.update_live_fields(&record.stable_id, &fields)?;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                let workspace_id = self.target_workspace_id()?;
                groups.insert(NewTabGroup {
                    external_id: Some(live.id),
                    window_id: live.window_id,
                    workspace_id,
                    title: live.title.clone(),
                    color: live.color.clone(),
                    collapsed: live.collapsed,
                })?;
                Ok(UpsertOutcome::Created)
            }
        }
    }

    /// Disambiguate what a live removal notification means. Active member
    /// tabs imply a genuine user ungroup or close; archived-only members mean
    /// a workspace switch tore down the live layer and the record must
    /// survive for rematerialization.
    async fn handle_group_removed(&self, group_id: i64) -> Result<(), EngineError> {
        let groups = TabGroupRepository::new(&self.store);
        let record = match groups.find_active_by_external(group_id)? {
            Some(record) => record,
            None => {
                debug!(group_id, "removal for untracked group, ignoring");
                return Ok(());
            }
        };

        let tabs = TabRepository::new(&self.store);
        let active_members =
            tabs.list_group_members(record.workspace_id, group_id, ItemStatus::Active)?;

        if !active_members.is_empty() {
            // The group vanished while its members are tracked as live. Weed
            // out members that no longer exist live, unset the rest to
            // ungrouped, and drop the group record.
            let live_ids: HashSet<i64> = self
                .host
                .list_tabs()
                .await?
                .iter()
                .map(|tab| tab.id)
                .collect();
            let mut orphaned: Vec<String> = Vec::new();
            let mut surviving: Vec<String> = Vec::new();
            for member in &active_members {
                match member.external_id {
                    Some(external_id) if live_ids.contains(&external_id) => {
                        surviving.push(member.stable_id.clone());
                    }
                    _ => orphaned.push(member.stable_id.clone()),
                }
            }
            if !orphaned.is_empty() {
                match tabs.delete_many(&orphaned) {
                    Ok(count) => debug!(group_id, count, "deleted orphaned group members"),
                    Err(err) => warn!(group_id, error = %err, "orphaned member cleanup failed"),
                }
            }
            if let Err(err) = tabs.set_group_many(&surviving, None) {
                warn!(group_id, error = %err, "unsetting member group references failed");
            }
            groups.delete(&record.stable_id)?;
            debug!(group_id, stable_id = %record.stable_id, "group deleted after user removal");
            return Ok(());
        }

        let archived_members =
            tabs.list_group_members(record.workspace_id, group_id, ItemStatus::Archived)?;
        if !archived_members.is_empty() {
            groups.archive(&record.stable_id)?;
            debug!(group_id, stable_id = %record.stable_id, "group archived after workspace teardown");
        } else {
            groups.delete(&record.stable_id)?;
            debug!(group_id, stable_id = %record.stable_id, "group deleted, no members reference it");
        }
        Ok(())
    }
}
