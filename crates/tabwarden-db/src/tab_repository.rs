//! Tab records: the persisted mirror of live tabs.
//!
//! `stable_id` is the durable identity; `external_id` is the host's transient
//! id and is absent while a tab is not materialized.

use rusqlite::{params, OptionalExtension};

use crate::{new_stable_id, now_ms, ItemStatus, Store, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub struct Tab {
    pub stable_id: String,
    pub external_id: Option<i64>,
    pub window_id: i64,
    pub group_id: Option<i64>,
    pub workspace_id: i64,
    pub tab_index: i64,
    pub url: String,
    pub title: String,
    pub pinned: bool,
    pub status: ItemStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fields supplied when inserting a new record. New records are always
/// created active; `stable_id` and timestamps are assigned by the repository.
#[derive(Debug, Clone)]
pub struct NewTab {
    pub external_id: Option<i64>,
    pub window_id: i64,
    pub group_id: Option<i64>,
    pub workspace_id: i64,
    pub tab_index: i64,
    pub url: String,
    pub title: String,
    pub pinned: bool,
}

/// The mutable live-side fields, written as one unit so a record never holds
/// a half-updated mirror of a live tab.
#[derive(Debug, Clone)]
pub struct TabLiveFields {
    pub external_id: Option<i64>,
    pub window_id: i64,
    pub group_id: Option<i64>,
    pub tab_index: i64,
    pub url: String,
    pub title: String,
    pub pinned: bool,
}

impl Tab {
    /// True when any live-side field differs from `fields`.
    pub fn differs_from(&self, fields: &TabLiveFields) -> bool {
        self.external_id != fields.external_id
            || self.window_id != fields.window_id
            || self.group_id != fields.group_id
            || self.tab_index != fields.tab_index
            || self.url != fields.url
            || self.title != fields.title
            || self.pinned != fields.pinned
    }
}

pub struct TabRepository<'a> {
    db: &'a Store,
}

impl<'a> TabRepository<'a> {
    pub fn new(db: &'a Store) -> Self {
        Self { db }
    }

    pub fn insert(&self, new: NewTab) -> Result<Tab, StoreError> {
        let stable_id = new_stable_id();
        let now = now_ms();

        self.db.conn().execute(
            "INSERT INTO tabs (stable_id, external_id, window_id, group_id, workspace_id, \
             tab_index, url, title, pinned, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                stable_id,
                new.external_id,
                new.window_id,
                new.group_id,
                new.workspace_id,
                new.tab_index,
                new.url,
                new.title,
                new.pinned as i64,
                ItemStatus::Active.as_str(),
                now,
                now
            ],
        )?;

        Ok(Tab {
            stable_id,
            external_id: new.external_id,
            window_id: new.window_id,
            group_id: new.group_id,
            workspace_id: new.workspace_id,
            tab_index: new.tab_index,
            url: new.url,
            title: new.title,
            pinned: new.pinned,
            status: ItemStatus::Active,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get(&self, stable_id: &str) -> Result<Tab, StoreError> {
        let row = self
            .db
            .conn()
            .query_row(
                &format!("{SELECT_TAB} WHERE stable_id = ?1"),
                params![stable_id],
                scan_tab,
            )
            .optional()?;
        row.ok_or(StoreError::TabNotFound)
    }

    /// All records for a workspace, any status, in deterministic mirror order.
    pub fn list_for_workspace(&self, workspace_id: i64) -> Result<Vec<Tab>, StoreError> {
        let mut stmt = self.db.conn().prepare(&format!(
            "{SELECT_TAB} WHERE workspace_id = ?1 ORDER BY window_id, tab_index, stable_id"
        ))?;
        let rows = stmt.query_map(params![workspace_id], scan_tab)?;
        collect_tabs(rows)
    }

    pub fn list_by_status(
        &self,
        workspace_id: i64,
        status: ItemStatus,
    ) -> Result<Vec<Tab>, StoreError> {
        let mut stmt = self.db.conn().prepare(&format!(
            "{SELECT_TAB} WHERE workspace_id = ?1 AND status = ?2 \
             ORDER BY window_id, tab_index, stable_id"
        ))?;
        let rows = stmt.query_map(params![workspace_id, status.as_str()], scan_tab)?;
        collect_tabs(rows)
    }

    /// Records referencing a live group id within a workspace, filtered by
    /// status. Used for group-removal disambiguation.
    pub fn list_group_members(
        &self,
        workspace_id: i64,
        group_external_id: i64,
        status: ItemStatus,
    ) -> Result<Vec<Tab>, StoreError> {
        let mut stmt = self.db.conn().prepare(&format!(
            "{SELECT_TAB} WHERE workspace_id = ?1 AND group_id = ?2 AND status = ?3 \
             ORDER BY window_id, tab_index, stable_id"
        ))?;
        let rows = stmt.query_map(
            params![workspace_id, group_external_id, status.as_str()],
            scan_tab,
        )?;
        collect_tabs(rows)
    }

    /// Overwrite the live-side fields, preserving identity, status, and
    /// `created_at`.
    pub fn update_live_fields(
        &self,
        stable_id: &str,
        fields: &TabLiveFields,
    ) -> Result<(), StoreError> {
        let changed = self.db.conn().execute(
            "UPDATE tabs SET external_id = ?1, window_id = ?2, group_id = ?3, tab_index = ?4, \
             url = ?5, title = ?6, pinned = ?7, updated_at = ?8 WHERE stable_id = ?9",
            params![
                fields.external_id,
                fields.window_id,
                fields.group_id,
                fields.tab_index,
                fields.url,
                fields.title,
                fields.pinned as i64,
                now_ms(),
                stable_id
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::TabNotFound);
        }
        Ok(())
    }

    /// Point a record at a freshly created live tab and mark it active.
    pub fn materialize(&self, stable_id: &str, fields: &TabLiveFields) -> Result<(), StoreError> {
        let changed = self.db.conn().execute(
            "UPDATE tabs SET external_id = ?1, window_id = ?2, group_id = ?3, tab_index = ?4, \
             url = ?5, title = ?6, pinned = ?7, status = ?8, updated_at = ?9 WHERE stable_id = ?10",
            params![
                fields.external_id,
                fields.window_id,
                fields.group_id,
                fields.tab_index,
                fields.url,
                fields.title,
                fields.pinned as i64,
                ItemStatus::Active.as_str(),
                now_ms(),
                stable_id
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::TabNotFound);
        }
        Ok(())
    }

    pub fn set_index(&self, stable_id: &str, tab_index: i64) -> Result<(), StoreError> {
        let changed = self.db.conn().execute(
            "UPDATE tabs SET tab_index = ?1, updated_at = ?2 WHERE stable_id = ?3",
            params![tab_index, now_ms(), stable_id],
        )?;
        if changed == 0 {
            return Err(StoreError::TabNotFound);
        }
        Ok(())
    }

    /// Archive every active record of a workspace; returns rows changed.
    pub fn archive_workspace_tabs(&self, workspace_id: i64) -> Result<usize, StoreError> {
        let changed = self.db.conn().execute(
            "UPDATE tabs SET status = ?1, updated_at = ?2 WHERE workspace_id = ?3 AND status = ?4",
            params![
                ItemStatus::Archived.as_str(),
                now_ms(),
                workspace_id,
                ItemStatus::Active.as_str()
            ],
        )?;
        Ok(changed)
    }

    /// Drop the previous archived generation of a workspace.
    pub fn delete_archived_for_workspace(&self, workspace_id: i64) -> Result<usize, StoreError> {
        let changed = self.db.conn().execute(
            "DELETE FROM tabs WHERE workspace_id = ?1 AND status = ?2",
            params![workspace_id, ItemStatus::Archived.as_str()],
        )?;
        Ok(changed)
    }

    /// Bulk-archive by stable id in a single statement.
    pub fn archive_many(&self, stable_ids: &[String]) -> Result<usize, StoreError> {
        if stable_ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE tabs SET status = ?, updated_at = ? WHERE stable_id IN ({})",
            placeholders(stable_ids.len())
        );
        let now = now_ms();
        let status = ItemStatus::Archived.as_str();
        let mut values: Vec<&dyn rusqlite::ToSql> = vec![&status, &now];
        for id in stable_ids {
            values.push(id);
        }
        let changed = self.db.conn().execute(&sql, &values[..])?;
        Ok(changed)
    }

    /// Bulk-delete by stable id in a single statement.
    pub fn delete_many(&self, stable_ids: &[String]) -> Result<usize, StoreError> {
        if stable_ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM tabs WHERE stable_id IN ({})",
            placeholders(stable_ids.len())
        );
        let mut values: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(stable_ids.len());
        for id in stable_ids {
            values.push(id);
        }
        let changed = self.db.conn().execute(&sql, &values[..])?;
        Ok(changed)
    }

    /// Point member records at a different live group id (or NULL).
    pub fn set_group_many(
        &self,
        stable_ids: &[String],
        group_id: Option<i64>,
    ) -> Result<usize, StoreError> {
        if stable_ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE tabs SET group_id = ?, updated_at = ? WHERE stable_id IN ({})",
            placeholders(stable_ids.len())
        );
        let now = now_ms();
        let mut values: Vec<&dyn rusqlite::ToSql> = vec![&group_id, &now];
        for id in stable_ids {
            values.push(id);
        }
        let changed = self.db.conn().execute(&sql, &values[..])?;
        Ok(changed)
    }

    /// Unset `group_id` on active records referencing a live group id.
    /// Used when startup sync archives a group that no longer exists live.
    pub fn clear_group_references(
        &self,
        workspace_id: i64,
        group_external_id: i64,
    ) -> Result<usize, StoreError> {
        let changed = self.db.conn().execute(
            "UPDATE tabs SET group_id = NULL, updated_at = ?1 \
             WHERE workspace_id = ?2 AND group_id = ?3 AND status = ?4",
            params![
                now_ms(),
                workspace_id,
                group_external_id,
                ItemStatus::Active.as_str()
            ],
        )?;
        Ok(changed)
    }
}

const SELECT_TAB: &str = "SELECT stable_id, external_id, window_id, group_id, workspace_id, \
                          tab_index, url, title, pinned, status, created_at, updated_at FROM tabs";

fn scan_tab(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tab> {
    let pinned: i64 = row.get(8)?;
    let status_raw: String = row.get(9)?;
    let status = ItemStatus::parse(&status_raw).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            9,
            rusqlite::types::Type::Text,
            format!("invalid item status: {status_raw}").into(),
        )
    })?;
    Ok(Tab {
        stable_id: row.get(0)?,
        external_id: row.get(1)?,
        window_id: row.get(2)?,
        group_id: row.get(3)?,
        workspace_id: row.get(4)?,
        tab_index: row.get(5)?,
        url: row.get(6)?,
        title: row.get(7)?,
        pinned: pinned != 0,
        status,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn collect_tabs(
    rows: impl Iterator<Item = rusqlite::Result<Tab>>,
) -> Result<Vec<Tab>, StoreError> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn placeholders(count: usize) -> String {
    let mut out = String::with_capacity(count * 3);
    for i in 0..count {
        if i > 0 {
            out.push_str(", ");
        }
        out.push('?');
    }
    out
}
