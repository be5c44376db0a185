//! Workspace repository integration tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tabwarden_db::workspace_repository::WorkspaceRepository;
use tabwarden_db::{Config, Store, StoreError};

fn temp_db_path(prefix: &str) -> PathBuf {
    static UNIQUE_SUFFIX: AtomicU64 = AtomicU64::new(0);
    let nanos = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos(),
        Err(_) => 0,
    };
    let suffix = UNIQUE_SUFFIX.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "tabwarden-workspace-{prefix}-{nanos}-{}-{suffix}.sqlite",
        std::process::id(),
    ))
}

fn setup_db(tag: &str) -> (Store, PathBuf) {
    let path = temp_db_path(tag);
    let db = match Store::open(Config::new(&path)) {
        Ok(db) => db,
        Err(err) => panic!("open store: {err}"),
    };
    if let Err(err) = db.migrate_up() {
        panic!("migrate_up: {err}");
    }
    (db, path)
}

#[test]
fn create_get_list_roundtrip() {
    let (db, path) = setup_db("roundtrip");
    let repo = WorkspaceRepository::new(&db);

    let research = match repo.create("  Research  ", None) {
        Ok(workspace) => workspace,
        Err(err) => panic!("create Research: {err}"),
    };
    assert!(research.id > 0);
    assert_eq!(research.name, "Research");
    assert!(!research.active);
    assert!(research.resource_group_ids.is_empty());
    assert_eq!(research.created_at, research.last_opened);

    let admin = match repo.create("Admin", Some(7)) {
        Ok(workspace) => workspace,
        Err(err) => panic!("create Admin: {err}"),
    };
    assert_eq!(admin.group_id, Some(7));

    let fetched = match repo.get(research.id) {
        Ok(workspace) => workspace,
        Err(err) => panic!("get: {err}"),
    };
    assert_eq!(fetched, research);

    let listed = match repo.list() {
        Ok(listed) => listed,
        Err(err) => panic!("list: {err}"),
    };
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].name, "Admin");
    assert_eq!(listed[1].name, "Research");

    let _ = std::fs::remove_file(path);
}

#[test]
fn create_rejects_blank_names() {
    let (db, path) = setup_db("blank-name");
    let repo = WorkspaceRepository::new(&db);

    let empty = repo.create("", None);
    assert!(
        matches!(empty, Err(StoreError::Validation(_))),
        "expected validation error, got: {empty:?}"
    );
    let whitespace = repo.create("   ", None);
    assert!(
        matches!(whitespace, Err(StoreError::Validation(_))),
        "expected validation error, got: {whitespace:?}"
    );

    let _ = std::fs::remove_file(path);
}

#[test]
fn get_missing_workspace_fails() {
    let (db, path) = setup_db("missing");
    let repo = WorkspaceRepository::new(&db);

    let missing = repo.get(404);
    assert!(
        matches!(missing, Err(StoreError::WorkspaceNotFound)),
        "expected WorkspaceNotFound, got: {missing:?}"
    );

    let _ = std::fs::remove_file(path);
}

#[test]
fn active_flag_is_exclusive() {
    let (db, path) = setup_db("active");
    let repo = WorkspaceRepository::new(&db);

    let first = match repo.create("First", None) {
        Ok(workspace) => workspace,
        Err(err) => panic!("create First: {err}"),
    };
    let second = match repo.create("Second", None) {
        Ok(workspace) => workspace,
        Err(err) => panic!("create Second: {err}"),
    };

    let none_active = match repo.active_workspace() {
        Ok(active) => active,
        Err(err) => panic!("active_workspace: {err}"),
    };
    assert!(none_active.is_none());

    if let Err(err) = repo.set_active_exclusive(first.id) {
        panic!("set_active_exclusive(first): {err}");
    }
    if let Err(err) = repo.set_active_exclusive(second.id) {
        panic!("set_active_exclusive(second): {err}");
    }

    let active = match repo.active_workspace() {
        Ok(Some(active)) => active,
        Ok(None) => panic!("expected an active workspace"),
        Err(err) => panic!("active_workspace: {err}"),
    };
    assert_eq!(active.id, second.id);
    assert!(active.last_opened >= second.last_opened);

    let first_again = match repo.get(first.id) {
        Ok(workspace) => workspace,
        Err(err) => panic!("get first: {err}"),
    };
    assert!(!first_again.active);

    let cleared = match repo.clear_active() {
        Ok(cleared) => cleared,
        Err(err) => panic!("clear_active: {err}"),
    };
    assert_eq!(cleared, 1);
    let after_clear = match repo.active_workspace() {
        Ok(active) => active,
        Err(err) => panic!("active_workspace after clear: {err}"),
    };
    assert!(after_clear.is_none());

    let _ = std::fs::remove_file(path);
}

#[test]
fn set_active_exclusive_missing_workspace_fails() {
    let (db, path) = setup_db("active-missing");
    let repo = WorkspaceRepository::new(&db);

    let missing = repo.set_active_exclusive(900);
    assert!(
        matches!(missing, Err(StoreError::WorkspaceNotFound)),
        "expected WorkspaceNotFound, got: {missing:?}"
    );

    let _ = std::fs::remove_file(path);
}

#[test]
fn append_resource_group_is_idempotent_and_ordered() {
    let (db, path) = setup_db("resource-groups");
    let repo = WorkspaceRepository::new(&db);

    let workspace = match repo.create("Docs", None) {
        Ok(workspace) => workspace,
        Err(err) => panic!("create: {err}"),
    };

    for group_id in [3, 1, 3, 2] {
        if let Err(err) = repo.append_resource_group(workspace.id, group_id) {
            panic!("append_resource_group({group_id}): {err}");
        }
    }

    let fetched = match repo.get(workspace.id) {
        Ok(workspace) => workspace,
        Err(err) => panic!("get: {err}"),
    };
    assert_eq!(fetched.resource_group_ids, vec![3, 1, 2]);

    let missing = repo.append_resource_group(999, 1);
    assert!(
        matches!(missing, Err(StoreError::WorkspaceNotFound)),
        "expected WorkspaceNotFound, got: {missing:?}"
    );

    let _ = std::fs::remove_file(path);
}
