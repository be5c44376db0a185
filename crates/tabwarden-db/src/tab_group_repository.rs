//! Tab group records: the persisted mirror of live tab groups.

use rusqlite::{params, OptionalExtension};

use crate::{new_stable_id, now_ms, ItemStatus, Store, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub struct TabGroup {
    pub stable_id: String,
    pub external_id: Option<i64>,
    pub window_id: i64,
    pub workspace_id: i64,
    pub title: String,
    pub color: String,
    pub collapsed: bool,
    pub status: ItemStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewTabGroup {
    pub external_id: Option<i64>,
    pub window_id: i64,
    pub workspace_id: i64,
    pub title: String,
    pub color: String,
    pub collapsed: bool,
}

/// Mutable live-side fields of a group record. `workspace_id` is deliberately
/// absent: a record never migrates between workspaces through live updates.
#[derive(Debug, Clone)]
pub struct GroupLiveFields {
    pub external_id: Option<i64>,
    pub window_id: i64,
    pub title: String,
    pub color: String,
    pub collapsed: bool,
}

impl TabGroup {
    pub fn differs_from(&self, fields: &GroupLiveFields) -> bool {
        self.external_id != fields.external_id
            || self.window_id != fields.window_id
            || self.title != fields.title
            || self.color != fields.color
            || self.collapsed != fields.collapsed
    }
}

pub struct TabGroupRepository<'a> {
    db: &'a Store,
}

impl<'a> TabGroupRepository<'a> {
    pub fn new(db: &'a Store) -> Self {
        Self { db }
    }

    pub fn insert(&self, new: NewTabGroup) -> Result<TabGroup, StoreError> {
        let stable_id = new_stable_id();
        let now = now_ms();

        self.db.conn().execute(
            "INSERT INTO tab_groups (stable_id, external_id, window_id, workspace_id, title, \
             color, collapsed, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                stable_id,
                new.external_id,
                new.window_id,
                new.workspace_id,
                new.title,
                new.color,
                new.collapsed as i64,
                ItemStatus::Active.as_str(),
                now,
                now
            ],
        )?;

        Ok(TabGroup {
            stable_id,
            external_id: new.external_id,
            window_id: new.window_id,
            workspace_id: new.workspace_id,
            title: new.title,
            color: new.color,
            collapsed: new.collapsed,
            status: ItemStatus::Active,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get(&self, stable_id: &str) -> Result<TabGroup, StoreError> {
        let row = self
            .db
            .conn()
            .query_row(
                &format!("{SELECT_GROUP} WHERE stable_id = ?1"),
                params![stable_id],
                scan_group,
            )
            .optional()?;
        row.ok_or(StoreError::TabGroupNotFound)
    }

    /// The active record mirroring a live group id, if one exists.
    pub fn find_active_by_external(
        &self,
        external_id: i64,
    ) -> Result<Option<TabGroup>, StoreError> {
        let row = self
            .db
            .conn()
            .query_row(
                &format!(
                    "{SELECT_GROUP} WHERE external_id = ?1 AND status = ?2 \
                     ORDER BY updated_at DESC, stable_id LIMIT 1"
                ),
                params![external_id, ItemStatus::Active.as_str()],
                scan_group,
            )
            .optional()?;
        Ok(row)
    }

    /// All records for a workspace, any status, in deterministic order.
    pub fn list_for_workspace(&self, workspace_id: i64) -> Result<Vec<TabGroup>, StoreError> {
        let mut stmt = self.db.conn().prepare(&format!(
            "{SELECT_GROUP} WHERE workspace_id = ?1 ORDER BY window_id, stable_id"
        ))?;
        let rows = stmt.query_map(params![workspace_id], scan_group)?;
        collect_groups(rows)
    }

    pub fn list_by_status(
        &self,
        workspace_id: i64,
        status: ItemStatus,
    ) -> Result<Vec<TabGroup>, StoreError> {
        let mut stmt = self.db.conn().prepare(&format!(
            "{SELECT_GROUP} WHERE workspace_id = ?1 AND status = ?2 ORDER BY window_id, stable_id"
        ))?;
        let rows = stmt.query_map(params![workspace_id, status.as_str()], scan_group)?;
        collect_groups(rows)
    }

    /// Every active record, across all workspaces. Startup sync diffs this
    /// against live enumeration.
    pub fn list_active(&self) -> Result<Vec<TabGroup>, StoreError> {
        let mut stmt = self.db.conn().prepare(&format!(
            "{SELECT_GROUP} WHERE status = ?1 ORDER BY workspace_id, window_id, stable_id"
        ))?;
        let rows = stmt.query_map(params![ItemStatus::Active.as_str()], scan_group)?;
        collect_groups(rows)
    }

    /// Merge live-side fields, preserving identity, workspace, status, and
    /// `created_at`.
    pub fn update_live_fields(
        &self,
        stable_id: &str,
        fields: &GroupLiveFields,
    ) -> Result<(), StoreError> {
        let changed = self.db.conn().execute(
            "UPDATE tab_groups SET external_id = ?1, window_id = ?2, title = ?3, color = ?4, \
             collapsed = ?5, updated_at = ?6 WHERE stable_id = ?7",
            params![
                fields.external_id,
                fields.window_id,
                fields.title,
                fields.color,
                fields.collapsed as i64,
                now_ms(),
                stable_id
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::TabGroupNotFound);
        }
        Ok(())
    }

    /// Point a record at a freshly created live group and mark it active.
    pub fn materialize(
        &self,
        stable_id: &str,
        fields: &GroupLiveFields,
    ) -> Result<(), StoreError> {
        let changed = self.db.conn().execute(
            "UPDATE tab_groups SET external_id = ?1, window_id = ?2, title = ?3, color = ?4, \
             collapsed = ?5, status = ?6, updated_at = ?7 WHERE stable_id = ?8",
            params![
                fields.external_id,
                fields.window_id,
                fields.title,
                fields.color,
                fields.collapsed as i64,
                ItemStatus::Active.as_str(),
                now_ms(),
                stable_id
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::TabGroupNotFound);
        }
        Ok(())
    }

    pub fn archive(&self, stable_id: &str) -> Result<(), StoreError> {
        let changed = self.db.conn().execute(
            "UPDATE tab_groups SET status = ?1, updated_at = ?2 WHERE stable_id = ?3",
            params![ItemStatus::Archived.as_str(), now_ms(), stable_id],
        )?;
        if changed == 0 {
            return Err(StoreError::TabGroupNotFound);
        }
        Ok(())
    }

    pub fn delete(&self, stable_id: &str) -> Result<(), StoreError> {
        let changed = self
            .db
            .conn()
            .execute("DELETE FROM tab_groups WHERE stable_id = ?1", params![stable_id])?;
        if changed == 0 {
            return Err(StoreError::TabGroupNotFound);
        }
        Ok(())
    }

    /// Delete every active record of a workspace; returns rows removed.
    /// Used when the user explicitly ungroups a whole workspace.
    pub fn delete_active_for_workspace(&self, workspace_id: i64) -> Result<usize, StoreError> {
        let changed = self.db.conn().execute(
            "DELETE FROM tab_groups WHERE workspace_id = ?1 AND status = ?2",
            params![workspace_id, ItemStatus::Active.as_str()],
        )?;
        Ok(changed)
    }
}

const SELECT_GROUP: &str = "SELECT stable_id, external_id, window_id, workspace_id, title, \
                            color, collapsed, status, created_at, updated_at FROM tab_groups";

fn scan_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<TabGroup> {
    let collapsed: i64 = row.get(6)?;
    let status_raw: String = row.get(7)?;
    let status = ItemStatus::parse(&status_raw).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            rusqlite::types::Type::Text,
            format!("invalid item status: {status_raw}").into(),
        )
    })?;
    Ok(TabGroup {
        stable_id: row.get(0)?,
        external_id: row.get(1)?,
        window_id: row.get(2)?,
        workspace_id: row.get(3)?,
        title: row.get(4)?,
        color: row.get(5)?,
        collapsed: collapsed != 0,
        status,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn collect_groups(
    rows: impl Iterator<Item = rusqlite::Result<TabGroup>>,
) -> Result<Vec<TabGroup>, StoreError> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
