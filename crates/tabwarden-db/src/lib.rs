//! tabwarden-db: SQLite storage + migration engine for Tabwarden.

pub mod resource_repository;
pub mod snapshot_repository;
pub mod tab_group_repository;
pub mod tab_repository;
pub mod workspace_repository;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use uuid::Uuid;

include!(concat!(env!("OUT_DIR"), "/migrations.rs"));

/// Crate identity label.
pub fn crate_label() -> &'static str {
    "tabwarden-db"
}

/// Sentinel workspace id for tabs claimed by no workspace. The unassigned
/// context has no `workspaces` row; records simply carry this id.
pub const UNASSIGNED_WORKSPACE_ID: i64 = -1;

/// Generate a fresh durable identity for a tab or tab group.
pub fn new_stable_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current time as epoch milliseconds, the timestamp unit of every table.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ---------------------------------------------------------------------------
// Shared record states
// ---------------------------------------------------------------------------

/// Lifecycle state shared by tab and tab-group records.
///
/// `Active` records mirror a live item; `Archived` records remember a layout
/// for later rematerialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Active,
    Archived,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Active => "active",
            ItemStatus::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Result<Self, StoreError> {
        match value {
            "active" => Ok(ItemStatus::Active),
            "archived" => Ok(ItemStatus::Archived),
            _ => Err(StoreError::Validation(format!(
                "invalid item status: {value}"
            ))),
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotReason {
    Interval,
    Manual,
    Event,
}

impl SnapshotReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotReason::Interval => "interval",
            SnapshotReason::Manual => "manual",
            SnapshotReason::Event => "event",
        }
    }

    pub fn parse(value: &str) -> Result<Self, StoreError> {
        match value {
            "interval" => Ok(SnapshotReason::Interval),
            "manual" => Ok(SnapshotReason::Manual),
            "event" => Ok(SnapshotReason::Event),
            _ => Err(StoreError::Validation(format!(
                "invalid snapshot reason: {value}"
            ))),
        }
    }
}

impl fmt::Display for SnapshotReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
}

impl Config {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: 5000,
        }
    }
}

#[derive(Debug)]
pub struct Store {
    conn: Connection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub version: i32,
    pub description: String,
    pub applied: bool,
    pub applied_at: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("migration {version} missing {direction} sql")]
    MissingSql {
        version: i32,
        direction: &'static str,
    },
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Transaction(String),
    #[error("workspace not found")]
    WorkspaceNotFound,
    #[error("tab not found")]
    TabNotFound,
    #[error("tab group not found")]
    TabGroupNotFound,
    #[error("snapshot not found")]
    SnapshotNotFound,
    #[error("resource group not found")]
    ResourceGroupNotFound,
}

impl Store {
    pub fn open(cfg: Config) -> Result<Self, StoreError> {
        ensure_parent_dir(&cfg.path)?;
        let conn = Connection::open(&cfg.path)?;
        conn.busy_timeout(Duration::from_millis(cfg.busy_timeout_ms))?;
        // Best-effort: ignore pragma errors on older SQLite builds.
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "foreign_keys", "ON");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        Ok(Self { conn })
    }

    pub fn migrate_up(&self) -> Result<usize, StoreError> {
        self.ensure_schema_version_table()?;
        let current = self.current_version()?;

        let mut applied = 0usize;
        for m in MIGRATIONS {
            if m.version <= current {
                continue;
            }
            self.apply_up(m)?;
            applied += 1;
        }
        Ok(applied)
    }

    pub fn migrate_down(&self, steps: i32) -> Result<usize, StoreError> {
        self.ensure_schema_version_table()?;
        let current = self.current_version()?;
        if current == 0 || steps <= 0 {
            return Ok(0);
        }

        let mut rolled_back = 0usize;
        for m in MIGRATIONS.iter().rev() {
            if m.version > current {
                continue;
            }
            if rolled_back >= steps as usize {
                break;
            }
            self.apply_down(m)?;
            rolled_back += 1;
        }
        Ok(rolled_back)
    }

    pub fn migrate_to(&self, target_version: i32) -> Result<(), StoreError> {
        self.ensure_schema_version_table()?;
        let current = self.current_version()?;
        if target_version == current {
            return Ok(());
        }

        if target_version > current {
            for m in MIGRATIONS {
                if m.version <= current || m.version > target_version {
                    continue;
                }
                self.apply_up(m)?;
            }
        } else {
            for m in MIGRATIONS.iter().rev() {
                if m.version <= target_version || m.version > current {
                    continue;
                }
                self.apply_down(m)?;
            }
        }
        Ok(())
    }

    pub fn migration_status(&self) -> Result<Vec<MigrationStatus>, StoreError> {
        self.ensure_schema_version_table()?;

        let mut applied_at: BTreeMap<i32, String> = BTreeMap::new();
        let mut stmt = self
            .conn
            .prepare("SELECT version, applied_at FROM schema_version ORDER BY version")?;
        let rows = stmt.query_map([], |row| {
            let version: i32 = row.get(0)?;
            let stamp: String = row.get(1)?;
            Ok((version, stamp))
        })?;
        for row in rows {
            let (version, stamp) = row?;
            applied_at.insert(version, stamp);
        }

        let mut status = Vec::with_capacity(MIGRATIONS.len());
        for m in MIGRATIONS {
            let stamp = applied_at.get(&m.version).cloned().unwrap_or_default();
            status.push(MigrationStatus {
                version: m.version,
                description: m.description.to_string(),
                applied: applied_at.contains_key(&m.version),
                applied_at: stamp,
            });
        }
        Ok(status)
    }

    pub fn schema_version(&self) -> Result<i32, StoreError> {
        self.ensure_schema_version_table()?;
        self.current_version()
    }

    fn apply_up(&self, m: &EmbeddedMigration) -> Result<(), StoreError> {
        if m.up_sql.is_empty() {
            return Err(StoreError::MissingSql {
                version: m.version,
                direction: "up",
            });
        }
        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(m.up_sql)?;
        tx.execute(
            "INSERT INTO schema_version (version, description) VALUES (?1, ?2)",
            params![m.version, m.description],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn apply_down(&self, m: &EmbeddedMigration) -> Result<(), StoreError> {
        if m.down_sql.is_empty() {
            return Err(StoreError::MissingSql {
                version: m.version,
                direction: "down",
            });
        }
        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(m.down_sql)?;
        tx.execute(
            "DELETE FROM schema_version WHERE version = ?1",
            params![m.version],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn ensure_schema_version_table(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (\n\
                version INTEGER PRIMARY KEY,\n\
                applied_at TEXT NOT NULL DEFAULT (datetime('now')),\n\
                description TEXT\n\
             );",
        )?;
        Ok(())
    }

    /// Returns a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside a SQLite transaction: explicit rollback on error,
    /// explicit commit on success.
    ///
    /// Takes `&self` via `unchecked_transaction`; the engine shares the store
    /// behind shared references on a single thread, so the unchecked variant
    /// is sound here and callers must not nest transactions.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let tx = self.conn.unchecked_transaction()?;

        match f(&tx) {
            Ok(v) => {
                tx.commit()?;
                Ok(v)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback() {
                    return Err(StoreError::Transaction(format!(
                        "rollback failed: {rb} (original error: {e})"
                    )));
                }
                Err(e)
            }
        }
    }

    fn current_version(&self) -> Result<i32, StoreError> {
        let version: Option<i32> = self
            .conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version.unwrap_or(0))
    }
}

fn ensure_parent_dir(path: &Path) -> Result<(), std::io::Error> {
    let parent = match path.parent() {
        Some(parent) => parent,
        None => return Ok(()),
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent)
}
