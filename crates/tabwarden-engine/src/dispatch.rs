//! Message dispatch: the typed request/response boundary exposed to UI and
//! external callers.
//!
//! Every request produces a `{success, ...}` JSON response. Errors never
//! propagate past this layer; store and validation failures come back as
//! `{success: false, error}` and unknown message types are rejected without
//! touching the engine.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use tabwarden_db::SnapshotReason;

use crate::cleaning::CleanReport;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::organize::{GroupKind, SortKind};
use crate::snapshot::RestoreMode;
use crate::switcher::SwitchReport;

/// Message types the dispatcher accepts. Anything else is answered with
/// `Unknown message type`.
const KNOWN_TYPES: [&str; 14] = [
    "openWorkspace",
    "closeWorkspace",
    "refreshTabs",
    "createSnapshot",
    "restoreSnapshot",
    "deleteSnapshot",
    "sortTabs",
    "groupTabs",
    "ungroupTabs",
    "cleanUnusedTabs",
    "cleanDuplicateTabs",
    "cleanResourceTabs",
    "cleanNonResourceTabs",
    "convertTabGroupToResource",
];

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum Request {
    OpenWorkspace {
        workspace_id: i64,
        #[serde(default)]
        skip_tab_switching: bool,
    },
    CloseWorkspace,
    RefreshTabs,
    CreateSnapshot {
        workspace_id: Option<i64>,
        reason: String,
    },
    RestoreSnapshot {
        snapshot_id: i64,
        mode: String,
    },
    DeleteSnapshot {
        snapshot_id: i64,
    },
    SortTabs {
        workspace_id: i64,
        sort_type: String,
    },
    GroupTabs {
        workspace_id: i64,
        group_type: String,
    },
    UngroupTabs {
        workspace_id: i64,
    },
    CleanUnusedTabs {
        workspace_id: i64,
        days_threshold: Option<i64>,
    },
    CleanDuplicateTabs {
        workspace_id: i64,
    },
    CleanResourceTabs {
        workspace_id: i64,
    },
    CleanNonResourceTabs {
        workspace_id: i64,
    },
    ConvertTabGroupToResource {
        group_id: i64,
    },
}

impl Engine {
    /// Handle one raw request and always produce a response value.
    pub async fn dispatch(&self, raw: &str) -> Value {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(err) => return failure(format!("invalid request: {err}")),
        };
        let message_type = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if !KNOWN_TYPES.contains(&message_type.as_str()) {
            return failure("Unknown message type");
        }
        let request: Request = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(err) => return failure(format!("invalid {message_type} request: {err}")),
        };
        debug!(message_type, "dispatching request");
        match self.handle(request).await {
            Ok(response) => response,
            Err(err) => failure(err.to_string()),
        }
    }

    async fn handle(&self, request: Request) -> Result<Value, EngineError> {
        match request {
            Request::OpenWorkspace {
                workspace_id,
                skip_tab_switching,
            } => {
                let report = self
                    .activate_workspace(workspace_id, skip_tab_switching)
                    .await?;
                Ok(switch_response(&report))
            }
            Request::CloseWorkspace => {
                let report = self.close_active_workspace().await?;
                Ok(switch_response(&report))
            }
            Request::RefreshTabs => match self.reconcile().await? {
                Some(summary) => Ok(json!({
                    "success": true,
                    "skipped": false,
                    "updated": summary.updated,
                    "adopted": summary.adopted,
                    "created": summary.created,
                    "removed": summary.removed,
                    "deduped": summary.deduped,
                })),
                None => Ok(json!({ "success": true, "skipped": true })),
            },
            Request::CreateSnapshot {
                workspace_id,
                reason,
            } => {
                let reason = SnapshotReason::parse(&reason)?;
                let snapshot_id = self.create_snapshot(workspace_id, reason)?;
                Ok(json!({ "success": true, "snapshotId": snapshot_id }))
            }
            Request::RestoreSnapshot { snapshot_id, mode } => {
                let mode = RestoreMode::parse(&mode).map_err(EngineError::Validation)?;
                let report = self.restore_snapshot(snapshot_id, mode).await?;
                Ok(json!({
                    "success": true,
                    "windowsCreated": report.windows_created,
                    "tabsCreated": report.tabs_created,
                    "groupsCreated": report.groups_created,
                    "failedTabs": report.failed_tabs,
                }))
            }
            Request::DeleteSnapshot { snapshot_id } => {
                self.delete_snapshot(snapshot_id)?;
                Ok(json!({ "success": true }))
            }
            Request::SortTabs {
                workspace_id,
                sort_type,
            } => {
                let kind = SortKind::parse(&sort_type).map_err(EngineError::Validation)?;
                let moved = self.sort_tabs(workspace_id, kind).await?;
                Ok(json!({ "success": true, "moved": moved }))
            }
            Request::GroupTabs {
                workspace_id,
                group_type,
            } => {
                let kind = GroupKind::parse(&group_type).map_err(EngineError::Validation)?;
                let report = self.group_tabs(workspace_id, kind).await?;
                Ok(json!({
                    "success": true,
                    "groupsCreated": report.groups_created,
                    "tabsGrouped": report.tabs_grouped,
                }))
            }
            Request::UngroupTabs { workspace_id } => {
                let ungrouped = self.ungroup_workspace_tabs(workspace_id).await?;
                Ok(json!({ "success": true, "ungrouped": ungrouped }))
            }
            Request::CleanUnusedTabs {
                workspace_id,
                days_threshold,
            } => {
                let report = self.clean_unused_tabs(workspace_id, days_threshold).await?;
                Ok(clean_response(&report))
            }
            Request::CleanDuplicateTabs { workspace_id } => {
                let report = self.clean_duplicate_tabs(workspace_id).await?;
                Ok(clean_response(&report))
            }
            Request::CleanResourceTabs { workspace_id } => {
                let report = self.clean_resource_tabs(workspace_id).await?;
                Ok(clean_response(&report))
            }
            Request::CleanNonResourceTabs { workspace_id } => {
                let report = self.clean_non_resource_tabs(workspace_id).await?;
                Ok(clean_response(&report))
            }
            Request::ConvertTabGroupToResource { group_id } => {
                let resource_group_id = self.convert_group_to_resource(group_id).await?;
                Ok(json!({ "success": true, "resourceGroupId": resource_group_id }))
            }
        }
    }
}

fn failure(message: impl Into<String>) -> Value {
    json!({ "success": false, "error": message.into() })
}

fn switch_response(report: &SwitchReport) -> Value {
    json!({
        "success": true,
        "archived": report.archived,
        "closed": report.closed,
        "windowsCreated": report.windows_created,
        "tabsCreated": report.tabs_created,
        "groupsCreated": report.groups_created,
        "failedTabs": report.failed_tabs,
    })
}

fn clean_response(report: &CleanReport) -> Value {
    json!({
        "success": true,
        "examined": report.examined,
        "closed": report.closed,
        "archived": report.archived,
    })
}
