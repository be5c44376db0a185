//! Workspace records: named contexts that own tabs and tab groups.
//!
//! At most one workspace row has `active = 1`. The unassigned context
//! (`UNASSIGNED_WORKSPACE_ID`) never has a row.

use rusqlite::{params, OptionalExtension};

use crate::{now_ms, Store, StoreError};

/// A named collection of tabs/groups. `resource_group_ids` is an ordered list
/// of resource group ids, stored as a JSON array column.
#[derive(Debug, Clone, PartialEq)]
pub struct Workspace {
    pub id: i64,
    pub group_id: Option<i64>,
    pub name: String,
    pub created_at: i64,
    pub last_opened: i64,
    pub active: bool,
    pub resource_group_ids: Vec<i64>,
}

pub struct WorkspaceRepository<'a> {
    db: &'a Store,
}

impl<'a> WorkspaceRepository<'a> {
    pub fn new(db: &'a Store) -> Self {
        Self { db }
    }

    pub fn create(&self, name: &str, group_id: Option<i64>) -> Result<Workspace, StoreError> {
        let name = validate_workspace_name(name)?;
        let now = now_ms();

        self.db.conn().execute(
            "INSERT INTO workspaces (group_id, name, created_at, last_opened, active, resource_group_ids) \
             VALUES (?1, ?2, ?3, ?4, 0, '[]')",
            params![group_id, name, now, now],
        )?;
        let id = self.db.conn().last_insert_rowid();

        Ok(Workspace {
            id,
            group_id,
            name,
            created_at: now,
            last_opened: now,
            active: false,
            resource_group_ids: Vec::new(),
        })
    }

    pub fn get(&self, workspace_id: i64) -> Result<Workspace, StoreError> {
        let row = self
            .db
            .conn()
            .query_row(
                "SELECT id, group_id, name, created_at, last_opened, active, resource_group_ids \
                 FROM workspaces WHERE id = ?1",
                params![workspace_id],
                scan_workspace,
            )
            .optional()?;
        row.ok_or(StoreError::WorkspaceNotFound)
    }

    pub fn list(&self) -> Result<Vec<Workspace>, StoreError> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, group_id, name, created_at, last_opened, active, resource_group_ids \
             FROM workspaces ORDER BY name, id",
        )?;
        let rows = stmt.query_map([], scan_workspace)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// The workspace currently holding `active = 1`, if any.
    pub fn active_workspace(&self) -> Result<Option<Workspace>, StoreError> {
        let row = self
            .db
            .conn()
            .query_row(
                "SELECT id, group_id, name, created_at, last_opened, active, resource_group_ids \
                 FROM workspaces WHERE active = 1 LIMIT 1",
                [],
                scan_workspace,
            )
            .optional()?;
        Ok(row)
    }

    /// Make `workspace_id` the single active workspace and stamp `last_opened`.
    /// Both flips happen in one transaction.
    pub fn set_active_exclusive(&self, workspace_id: i64) -> Result<(), StoreError> {
        self.db.transaction(|tx| {
            let changed = tx.execute(
                "UPDATE workspaces SET active = 1, last_opened = ?1 WHERE id = ?2",
                params![now_ms(), workspace_id],
            )?;
            if changed == 0 {
                return Err(StoreError::WorkspaceNotFound);
            }
            tx.execute(
                "UPDATE workspaces SET active = 0 WHERE id != ?1 AND active = 1",
                params![workspace_id],
            )?;
            Ok(())
        })
    }

    /// Clear every active flag; returns how many rows changed.
    pub fn clear_active(&self) -> Result<usize, StoreError> {
        let changed = self
            .db
            .conn()
            .execute("UPDATE workspaces SET active = 0 WHERE active = 1", [])?;
        Ok(changed)
    }

    /// Append a resource group id to the workspace's ordered list. Appending
    /// an id already present is a no-op.
    pub fn append_resource_group(
        &self,
        workspace_id: i64,
        resource_group_id: i64,
    ) -> Result<(), StoreError> {
        let workspace = self.get(workspace_id)?;
        if workspace.resource_group_ids.contains(&resource_group_id) {
            return Ok(());
        }

        let mut ids = workspace.resource_group_ids;
        ids.push(resource_group_id);
        let encoded = serde_json::to_string(&ids)
            .map_err(|err| StoreError::Validation(format!("encode resource group ids: {err}")))?;

        self.db.conn().execute(
            "UPDATE workspaces SET resource_group_ids = ?1 WHERE id = ?2",
            params![encoded, workspace_id],
        )?;
        Ok(())
    }
}

fn scan_workspace(row: &rusqlite::Row<'_>) -> rusqlite::Result<Workspace> {
    let active: i64 = row.get(5)?;
    let raw_group_ids: String = row.get(6)?;
    Ok(Workspace {
        id: row.get(0)?,
        group_id: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
        last_opened: row.get(4)?,
        active: active != 0,
        resource_group_ids: serde_json::from_str(&raw_group_ids).unwrap_or_default(),
    })
}

fn validate_workspace_name(name: &str) -> Result<String, StoreError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::Validation("workspace name is required".into()));
    }
    Ok(name.to_string())
}
