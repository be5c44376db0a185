//! Tab organization: in-place sorting, grouping by domain, ungrouping, and
//! converting a live group into a saved resource group.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashSet};

use tracing::{debug, warn};

use tabwarden_db::resource_repository::ResourceRepository;
use tabwarden_db::tab_group_repository::{NewTabGroup, TabGroupRepository};
use tabwarden_db::tab_repository::{Tab, TabRepository};
use tabwarden_db::workspace_repository::WorkspaceRepository;
use tabwarden_db::{ItemStatus, UNASSIGNED_WORKSPACE_ID};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::host::GroupUpdate;

/// Sort order for `sort_tabs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKind {
    Url,
    Title,
    /// Most recently updated first.
    Recency,
}

impl SortKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SortKind::Url => "url",
            SortKind::Title => "title",
            SortKind::Recency => "recency",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "url" => Ok(SortKind::Url),
            "title" => Ok(SortKind::Title),
            "recency" => Ok(SortKind::Recency),
            _ => Err(format!("invalid sort type: {value}")),
        }
    }
}

/// Bucketing rule for `group_tabs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Domain,
}

impl GroupKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GroupKind::Domain => "domain",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "domain" => Ok(GroupKind::Domain),
            _ => Err(format!("invalid group type: {value}")),
        }
    }
}

/// Counts from one grouping pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupingReport {
    pub groups_created: usize,
    pub tabs_grouped: usize,
}

impl Engine {
    /// Reorder each window's tabs in place. Pinned tabs keep the leading
    /// positions in their current relative order; unpinned tabs sort by
    /// `kind` behind them. Returns how many tabs changed position.
    pub async fn sort_tabs(
        &self,
        workspace_id: i64,
        kind: SortKind,
    ) -> Result<usize, EngineError> {
        let tabs = TabRepository::new(&self.store);
        let active = tabs.list_by_status(workspace_id, ItemStatus::Active)?;

        let mut partitions: BTreeMap<i64, Vec<&Tab>> = BTreeMap::new();
        for tab in &active {
            partitions.entry(tab.window_id).or_default().push(tab);
        }

        let mut moved = 0;
        for (_, partition) in partitions {
            let (pinned, mut unpinned): (Vec<&Tab>, Vec<&Tab>) =
                partition.into_iter().partition(|tab| tab.pinned);
            unpinned.sort_by(|a, b| sort_order(kind, a, b));

            for (position, record) in pinned.iter().chain(unpinned.iter()).enumerate() {
                let target = position as i64;
                if record.tab_index == target {
                    continue;
                }
                if let Some(external_id) = record.external_id {
                    if let Err(err) = self.host.move_tab(external_id, target).await {
                        warn!(external_id, target, error = %err, "moving tab failed");
                    }
                }
                if let Err(err) = tabs.set_index(&record.stable_id, target) {
                    warn!(stable_id = %record.stable_id, error = %err, "updating record index failed");
                }
                moved += 1;
            }
        }
        debug!(workspace_id, kind = kind.as_str(), moved, "sorted tabs");
        Ok(moved)
    }

    /// Bucket the workspace's ungrouped tabs and create a live group per
    /// bucket of two or more. Pinned tabs, the anchor surface, and tabs
    /// already in a group are left alone.
    pub async fn group_tabs(
        &self,
        workspace_id: i64,
        kind: GroupKind,
    ) -> Result<GroupingReport, EngineError> {
        let GroupKind::Domain = kind;

        let live_ids: HashSet<i64> = self
            .host
            .list_tabs()
            .await?
            .iter()
            .map(|tab| tab.id)
            .collect();
        let tabs = TabRepository::new(&self.store);
        let groups = TabGroupRepository::new(&self.store);
        let active = tabs.list_by_status(workspace_id, ItemStatus::Active)?;

        // (window, domain) -> (live member ids, member record ids).
        let mut buckets: BTreeMap<(i64, String), (Vec<i64>, Vec<String>)> = BTreeMap::new();
        for tab in &active {
            if tab.pinned || tab.group_id.is_some() || self.is_anchor_url(&tab.url) {
                continue;
            }
            let external_id = match tab.external_id {
                Some(id) if live_ids.contains(&id) => id,
                _ => continue,
            };
            let domain = match domain_of(&tab.url) {
                Some(domain) => domain.to_string(),
                None => continue,
            };
            let entry = buckets.entry((tab.window_id, domain)).or_default();
            entry.0.push(external_id);
            entry.1.push(tab.stable_id.clone());
        }

        let mut report = GroupingReport::default();
        for ((window_id, domain), (member_ids, member_stable_ids)) in buckets {
            if member_ids.len() < 2 {
                continue;
            }
            let group_id = match self.host.group_tabs(window_id, &member_ids).await {
                Ok(group_id) => group_id,
                Err(err) => {
                    warn!(window_id, domain = %domain, error = %err, "group creation failed");
                    continue;
                }
            };
            let update = GroupUpdate {
                title: Some(domain.clone()),
                color: None,
                collapsed: None,
            };
            if let Err(err) = self.host.update_group(group_id, update).await {
                warn!(group_id, error = %err, "titling group failed");
            }
            let new_group = NewTabGroup {
                external_id: Some(group_id),
                window_id,
                workspace_id,
                title: domain.clone(),
                // Whatever the host picked; the next group update event
                // corrects it.
                color: "grey".to_string(),
                collapsed: false,
            };
            if let Err(err) = groups.insert(new_group) {
                warn!(group_id, error = %err, "group record insert failed");
            }
            match tabs.set_group_many(&member_stable_ids, Some(group_id)) {
                Ok(count) => report.tabs_grouped += count,
                Err(err) => warn!(group_id, error = %err, "pointing members at group failed"),
            }
            report.groups_created += 1;
        }
        debug!(
            workspace_id,
            groups = report.groups_created,
            tabs = report.tabs_grouped,
            "grouped tabs by domain"
        );
        Ok(report)
    }

    /// Dissolve every group in the workspace, live and persisted. Returns
    /// how many tab records became ungrouped.
    pub async fn ungroup_workspace_tabs(&self, workspace_id: i64) -> Result<usize, EngineError> {
        let tabs = TabRepository::new(&self.store);
        let groups = TabGroupRepository::new(&self.store);
        let active = tabs.list_by_status(workspace_id, ItemStatus::Active)?;
        let grouped: Vec<&Tab> = active.iter().filter(|tab| tab.group_id.is_some()).collect();

        if grouped.is_empty() {
            let dropped = groups.delete_active_for_workspace(workspace_id)?;
            if dropped > 0 {
                debug!(workspace_id, dropped, "dropped memberless group records");
            }
            return Ok(0);
        }

        let live_ids: HashSet<i64> = self
            .host
            .list_tabs()
            .await?
            .iter()
            .map(|tab| tab.id)
            .collect();
        let ungroupable: Vec<i64> = grouped
            .iter()
            .filter_map(|tab| tab.external_id)
            .filter(|id| live_ids.contains(id))
            .collect();
        if !ungroupable.is_empty() {
            if let Err(err) = self.host.ungroup_tabs(&ungroupable).await {
                warn!(workspace_id, error = %err, "live ungroup failed");
            }
        }

        let stable_ids: Vec<String> = grouped.iter().map(|tab| tab.stable_id.clone()).collect();
        let changed = tabs.set_group_many(&stable_ids, None)?;
        let dropped = groups.delete_active_for_workspace(workspace_id)?;
        debug!(workspace_id, changed, dropped, "ungrouped workspace tabs");
        Ok(changed)
    }

    /// Save a live group's member URLs as a new resource group attached to
    /// the owning workspace. The live tabs stay open; this is a pure
    /// conversion. Returns the new resource group's id.
    pub async fn convert_group_to_resource(
        &self,
        group_external_id: i64,
    ) -> Result<i64, EngineError> {
        let groups = TabGroupRepository::new(&self.store);
        let record = groups
            .find_active_by_external(group_external_id)?
            .ok_or_else(|| {
                EngineError::Validation(format!(
                    "no active group tracks live group {group_external_id}"
                ))
            })?;

        let name = if record.title.trim().is_empty() {
            "Untitled group"
        } else {
            record.title.trim()
        };
        let resources = ResourceRepository::new(&self.store);
        let resource_group = resources.create_group(name)?;

        let tabs = TabRepository::new(&self.store);
        let members =
            tabs.list_group_members(record.workspace_id, group_external_id, ItemStatus::Active)?;
        let mut seen: HashSet<&str> = HashSet::new();
        let mut saved = 0;
        for member in &members {
            if member.url.is_empty() || !seen.insert(member.url.as_str()) {
                continue;
            }
            match resources.add_resource(resource_group.id, &member.url, &member.title) {
                Ok(_) => saved += 1,
                Err(err) => {
                    warn!(url = %member.url, error = %err, "saving member as resource failed");
                }
            }
        }

        if record.workspace_id != UNASSIGNED_WORKSPACE_ID {
            let workspaces = WorkspaceRepository::new(&self.store);
            workspaces.append_resource_group(record.workspace_id, resource_group.id)?;
        }
        debug!(
            group_external_id,
            resource_group_id = resource_group.id,
            saved,
            "converted group to resource group"
        );
        Ok(resource_group.id)
    }
}

fn sort_order(kind: SortKind, a: &Tab, b: &Tab) -> CmpOrdering {
    let primary = match kind {
        SortKind::Url => a.url.cmp(&b.url),
        SortKind::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        SortKind::Recency => b.updated_at.cmp(&a.updated_at),
    };
    primary.then_with(|| a.stable_id.cmp(&b.stable_id))
}

/// Grouping key for a URL: the host part with any `www.` prefix removed.
/// URLs with no scheme-delimited host cannot be bucketed.
fn domain_of(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("://")?;
    let host = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domains_strip_scheme_path_and_www() {
        assert_eq!(domain_of("https://example.com/a/b"), Some("example.com"));
        assert_eq!(domain_of("https://www.example.com"), Some("example.com"));
        assert_eq!(domain_of("http://sub.example.com?q=1"), Some("sub.example.com"));
        assert_eq!(domain_of("https://example.com#frag"), Some("example.com"));
        assert_eq!(domain_of("about:blank"), None);
        assert_eq!(domain_of("https://"), None);
    }

    #[test]
    fn sort_and_group_kinds_parse_known_values() {
        match SortKind::parse("recency") {
            Ok(SortKind::Recency) => {}
            other => panic!("expected recency, got: {other:?}"),
        }
        match SortKind::parse("alphabetical") {
            Err(message) => assert!(message.contains("invalid sort type")),
            other => panic!("expected parse failure, got: {other:?}"),
        }
        match GroupKind::parse("domain") {
            Ok(GroupKind::Domain) => {}
            other => panic!("expected domain, got: {other:?}"),
        }
        match GroupKind::parse("color") {
            Err(message) => assert!(message.contains("invalid group type")),
            other => panic!("expected parse failure, got: {other:?}"),
        }
    }
}
