//! Workspace snapshots: point-in-time captures of a workspace's tabs and
//! groups, stored in host-independent form.
//!
//! Snapshot rows never reference live window ids. Tabs carry a
//! `window_index` ordinal so a restore can recreate the same window
//! partitioning on whatever windows exist at restore time, and they
//! reference groups by the group's `stable_id` as remembered at capture.

use rusqlite::{params, OptionalExtension};

use crate::{now_ms, SnapshotReason, Store, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceSnapshot {
    pub id: i64,
    pub workspace_id: i64,
    pub created_at: i64,
    pub reason: SnapshotReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotTab {
    pub id: i64,
    pub snapshot_id: i64,
    pub window_index: i64,
    pub group_stable_id: Option<String>,
    pub tab_index: i64,
    pub url: String,
    pub title: String,
    pub pinned: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotTabGroup {
    pub id: i64,
    pub snapshot_id: i64,
    pub stable_id: String,
    pub title: String,
    pub color: String,
    pub collapsed: bool,
}

#[derive(Debug, Clone)]
pub struct NewSnapshotTab {
    pub window_index: i64,
    pub group_stable_id: Option<String>,
    pub tab_index: i64,
    pub url: String,
    pub title: String,
    pub pinned: bool,
}

#[derive(Debug, Clone)]
pub struct NewSnapshotGroup {
    pub stable_id: String,
    pub title: String,
    pub color: String,
    pub collapsed: bool,
}

pub struct SnapshotRepository<'a> {
    db: &'a Store,
}

impl<'a> SnapshotRepository<'a> {
    pub fn new(db: &'a Store) -> Self {
        Self { db }
    }

    /// Write the snapshot row and all of its children in one transaction,
    /// so a capture is either fully present or absent.
    pub fn create(
        &self,
        workspace_id: i64,
        reason: SnapshotReason,
        tabs: &[NewSnapshotTab],
        groups: &[NewSnapshotGroup],
    ) -> Result<i64, StoreError> {
        self.db.transaction(|tx| {
            tx.execute(
                "INSERT INTO workspace_snapshots (workspace_id, created_at, reason) \
                 VALUES (?1, ?2, ?3)",
                params![workspace_id, now_ms(), reason.as_str()],
            )?;
            let snapshot_id = tx.last_insert_rowid();

            for tab in tabs {
                tx.execute(
                    "INSERT INTO snapshot_tabs (snapshot_id, window_index, group_stable_id, \
                     tab_index, url, title, pinned) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        snapshot_id,
                        tab.window_index,
                        tab.group_stable_id,
                        tab.tab_index,
                        tab.url,
                        tab.title,
                        tab.pinned as i64
                    ],
                )?;
            }
            for group in groups {
                tx.execute(
                    "INSERT INTO snapshot_tab_groups (snapshot_id, stable_id, title, color, \
                     collapsed) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        snapshot_id,
                        group.stable_id,
                        group.title,
                        group.color,
                        group.collapsed as i64
                    ],
                )?;
            }
            Ok(snapshot_id)
        })
    }

    pub fn get(&self, snapshot_id: i64) -> Result<WorkspaceSnapshot, StoreError> {
        let row = self
            .db
            .conn()
            .query_row(
                "SELECT id, workspace_id, created_at, reason FROM workspace_snapshots \
                 WHERE id = ?1",
                params![snapshot_id],
                scan_snapshot,
            )
            .optional()?;
        row.ok_or(StoreError::SnapshotNotFound)
    }

    /// Newest first.
    pub fn list_for_workspace(
        &self,
        workspace_id: i64,
    ) -> Result<Vec<WorkspaceSnapshot>, StoreError> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, workspace_id, created_at, reason FROM workspace_snapshots \
             WHERE workspace_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![workspace_id], scan_snapshot)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Tabs of a snapshot in capture order: by window ordinal, then index.
    pub fn tabs_for(&self, snapshot_id: i64) -> Result<Vec<SnapshotTab>, StoreError> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, snapshot_id, window_index, group_stable_id, tab_index, url, title, \
             pinned FROM snapshot_tabs WHERE snapshot_id = ?1 \
             ORDER BY window_index, tab_index, id",
        )?;
        let rows = stmt.query_map(params![snapshot_id], |row| {
            let pinned: i64 = row.get(7)?;
            Ok(SnapshotTab {
                id: row.get(0)?,
                snapshot_id: row.get(1)?,
                window_index: row.get(2)?,
                group_stable_id: row.get(3)?,
                tab_index: row.get(4)?,
                url: row.get(5)?,
                title: row.get(6)?,
                pinned: pinned != 0,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn groups_for(&self, snapshot_id: i64) -> Result<Vec<SnapshotTabGroup>, StoreError> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, snapshot_id, stable_id, title, color, collapsed \
             FROM snapshot_tab_groups WHERE snapshot_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![snapshot_id], |row| {
            let collapsed: i64 = row.get(5)?;
            Ok(SnapshotTabGroup {
                id: row.get(0)?,
                snapshot_id: row.get(1)?,
                stable_id: row.get(2)?,
                title: row.get(3)?,
                color: row.get(4)?,
                collapsed: collapsed != 0,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Delete a snapshot and its children. Children go first; the schema
    /// has no ON DELETE CASCADE.
    pub fn delete(&self, snapshot_id: i64) -> Result<(), StoreError> {
        self.db.transaction(|tx| {
            tx.execute(
                "DELETE FROM snapshot_tabs WHERE snapshot_id = ?1",
                params![snapshot_id],
            )?;
            tx.execute(
                "DELETE FROM snapshot_tab_groups WHERE snapshot_id = ?1",
                params![snapshot_id],
            )?;
            let changed = tx.execute(
                "DELETE FROM workspace_snapshots WHERE id = ?1",
                params![snapshot_id],
            )?;
            if changed == 0 {
                return Err(StoreError::SnapshotNotFound);
            }
            Ok(())
        })
    }
}

fn scan_snapshot(row: &rusqlite::Row<'_>) -> rusqlite::Result<WorkspaceSnapshot> {
    let reason_raw: String = row.get(3)?;
    let reason = SnapshotReason::parse(&reason_raw).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("invalid snapshot reason: {reason_raw}").into(),
        )
    })?;
    Ok(WorkspaceSnapshot {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        created_at: row.get(2)?,
        reason,
    })
}
