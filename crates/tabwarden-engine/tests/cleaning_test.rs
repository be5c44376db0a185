#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Cleaning pass tests: unused, duplicate, and resource-membership sweeps.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tabwarden_db::resource_repository::ResourceRepository;
use tabwarden_db::tab_repository::{NewTab, TabRepository};
use tabwarden_db::workspace_repository::WorkspaceRepository;
use tabwarden_db::{now_ms, Config, ItemStatus, Store, UNASSIGNED_WORKSPACE_ID};
use tabwarden_engine::host::LiveWindow;
use tabwarden_engine::mock::{live_tab, HostCall, InMemoryHost};
use tabwarden_engine::{Engine, EngineConfig, EngineError};

const ANCHOR_URL: &str = "tabwarden://dashboard";
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

static DB_SEQ: AtomicU64 = AtomicU64::new(0);

fn temp_db_path(tag: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let seq = DB_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut path = std::env::temp_dir();
    path.push(format!(
        "tabwarden-cleaning-{tag}-{seq}-{nanos}-{}.sqlite",
        std::process::id()
    ));
    path
}

fn new_engine(tag: &str, host: Arc<InMemoryHost>) -> (Engine, PathBuf) {
    let path = temp_db_path(tag);
    let store = Store::open(Config::new(&path)).unwrap();
    store.migrate_up().unwrap();
    let engine = Engine::new(store, host, EngineConfig::default()).unwrap();
    (engine, path)
}

fn tab_record(workspace_id: i64, external_id: Option<i64>, url: &str) -> NewTab {
    NewTab {
        external_id,
        window_id: 1,
        group_id: None,
        workspace_id,
        tab_index: 0,
        url: url.to_string(),
        title: url.to_string(),
        pinned: false,
    }
}

fn set_updated_at(engine: &Engine, stable_id: &str, updated_at: i64) {
    engine
        .store()
        .conn()
        .execute(
            "UPDATE tabs SET updated_at = ?1 WHERE stable_id = ?2",
            rusqlite::params![updated_at, stable_id],
        )
        .unwrap();
}

// ── Unused pass ──

#[tokio::test]
async fn unused_pass_archives_old_tabs_and_closes_live() {
    let host = Arc::new(
        InMemoryHost::new()
            .with_window(LiveWindow {
                id: 1,
                focused: true,
            })
            .with_tab(live_tab(1, 1, 0, ANCHOR_URL))
            .with_tab(live_tab(10, 1, 1, "https://old.example/"))
            .with_tab(live_tab(11, 1, 2, "https://fresh.example/")),
    );
    let (engine, db_path) = new_engine("unused", Arc::clone(&host));

    let tabs = TabRepository::new(engine.store());
    let old = tabs
        .insert(tab_record(
            UNASSIGNED_WORKSPACE_ID,
            Some(10),
            "https://old.example/",
        ))
        .unwrap();
    let fresh = tabs
        .insert(tab_record(
            UNASSIGNED_WORKSPACE_ID,
            Some(11),
            "https://fresh.example/",
        ))
        .unwrap();
    set_updated_at(&engine, &old.stable_id, now_ms() - 10 * DAY_MS);

    let report = engine
        .clean_unused_tabs(UNASSIGNED_WORKSPACE_ID, None)
        .await
        .unwrap();
    assert_eq!(report.examined, 2);
    assert_eq!(report.closed, 1);
    assert_eq!(report.archived, 1);

    assert_eq!(tabs.get(&old.stable_id).unwrap().status, ItemStatus::Archived);
    assert_eq!(tabs.get(&fresh.stable_id).unwrap().status, ItemStatus::Active);
    let live_ids: Vec<i64> = host.tabs().iter().map(|t| t.id).collect();
    assert!(!live_ids.contains(&10));
    assert!(live_ids.contains(&11));
    assert!(live_ids.contains(&1));

    let _ = std::fs::remove_file(db_path);
}

#[tokio::test]
async fn unused_pass_honors_day_override() {
    let host = Arc::new(
        InMemoryHost::new()
            .with_window(LiveWindow {
                id: 1,
                focused: true,
            })
            .with_tab(live_tab(10, 1, 0, "https://idle.example/")),
    );
    let (engine, db_path) = new_engine("override", host);

    let tabs = TabRepository::new(engine.store());
    let idle = tabs
        .insert(tab_record(
            UNASSIGNED_WORKSPACE_ID,
            Some(10),
            "https://idle.example/",
        ))
        .unwrap();
    set_updated_at(&engine, &idle.stable_id, now_ms() - 2 * DAY_MS);

    // Two days idle is under the 7-day default but over a 1-day override.
    let untouched = engine
        .clean_unused_tabs(UNASSIGNED_WORKSPACE_ID, None)
        .await
        .unwrap();
    assert_eq!(untouched.archived, 0);

    let swept = engine
        .clean_unused_tabs(UNASSIGNED_WORKSPACE_ID, Some(1))
        .await
        .unwrap();
    assert_eq!(swept.archived, 1);

    let _ = std::fs::remove_file(db_path);
}

#[tokio::test]
async fn threshold_validation_rejects_zero_days() {
    let host = Arc::new(InMemoryHost::new());
    let (engine, db_path) = new_engine("threshold", host);

    let err = engine
        .clean_unused_tabs(UNASSIGNED_WORKSPACE_ID, Some(0))
        .await
        .unwrap_err();
    match err {
        EngineError::Validation(message) => assert!(message.contains("at least 1")),
        unexpected => panic!("expected validation error, got {unexpected}"),
    }

    let _ = std::fs::remove_file(db_path);
}

#[tokio::test]
async fn pinned_and_anchor_are_exempt() {
    let host = Arc::new(
        InMemoryHost::new()
            .with_window(LiveWindow {
                id: 1,
                focused: true,
            })
            .with_tab(live_tab(1, 1, 0, ANCHOR_URL))
            .with_tab(live_tab(10, 1, 1, "https://pinned.example/"))
            .with_tab(live_tab(11, 1, 2, "https://plain.example/")),
    );
    let (engine, db_path) = new_engine("exempt", host);

    let tabs = TabRepository::new(engine.store());
    let anchor = tabs
        .insert(tab_record(UNASSIGNED_WORKSPACE_ID, Some(1), ANCHOR_URL))
        .unwrap();
    let mut pinned_new = tab_record(UNASSIGNED_WORKSPACE_ID, Some(10), "https://pinned.example/");
    pinned_new.pinned = true;
    let pinned = tabs.insert(pinned_new).unwrap();
    let plain = tabs
        .insert(tab_record(
            UNASSIGNED_WORKSPACE_ID,
            Some(11),
            "https://plain.example/",
        ))
        .unwrap();
    for record in [&anchor, &pinned, &plain] {
        set_updated_at(&engine, &record.stable_id, now_ms() - 30 * DAY_MS);
    }

    let report = engine
        .clean_unused_tabs(UNASSIGNED_WORKSPACE_ID, None)
        .await
        .unwrap();
    assert_eq!(report.examined, 3);
    assert_eq!(report.archived, 1);

    assert_eq!(tabs.get(&anchor.stable_id).unwrap().status, ItemStatus::Active);
    assert_eq!(tabs.get(&pinned.stable_id).unwrap().status, ItemStatus::Active);
    assert_eq!(tabs.get(&plain.stable_id).unwrap().status, ItemStatus::Archived);

    let _ = std::fs::remove_file(db_path);
}

// ── Duplicate pass ──

#[tokio::test]
async fn duplicate_pass_keeps_most_recent() {
    let host = Arc::new(
        InMemoryHost::new()
            .with_window(LiveWindow {
                id: 1,
                focused: true,
            })
            .with_tab(live_tab(10, 1, 0, "https://dup.example/"))
            .with_tab(live_tab(11, 1, 1, "https://dup.example/"))
            .with_tab(live_tab(12, 1, 2, "https://dup.example/"))
            .with_tab(live_tab(13, 1, 3, "https://unique.example/")),
    );
    let (engine, db_path) = new_engine("duplicate", Arc::clone(&host));

    let tabs = TabRepository::new(engine.store());
    let mut by_age = Vec::new();
    for (external_id, stamp) in [(10, 3_000), (11, 2_000), (12, 1_000)] {
        let record = tabs
            .insert(tab_record(
                UNASSIGNED_WORKSPACE_ID,
                Some(external_id),
                "https://dup.example/",
            ))
            .unwrap();
        set_updated_at(&engine, &record.stable_id, stamp);
        by_age.push(record);
    }
    let unique = tabs
        .insert(tab_record(
            UNASSIGNED_WORKSPACE_ID,
            Some(13),
            "https://unique.example/",
        ))
        .unwrap();

    let report = engine
        .clean_duplicate_tabs(UNASSIGNED_WORKSPACE_ID)
        .await
        .unwrap();
    assert_eq!(report.examined, 4);
    assert_eq!(report.closed, 2);
    assert_eq!(report.archived, 2);

    assert_eq!(
        tabs.get(&by_age[0].stable_id).unwrap().status,
        ItemStatus::Active
    );
    assert_eq!(
        tabs.get(&by_age[1].stable_id).unwrap().status,
        ItemStatus::Archived
    );
    assert_eq!(
        tabs.get(&by_age[2].stable_id).unwrap().status,
        ItemStatus::Archived
    );
    assert_eq!(tabs.get(&unique.stable_id).unwrap().status, ItemStatus::Active);

    let _ = std::fs::remove_file(db_path);
}

#[tokio::test]
async fn duplicate_pass_without_duplicates_is_noop() {
    let host = Arc::new(
        InMemoryHost::new()
            .with_window(LiveWindow {
                id: 1,
                focused: true,
            })
            .with_tab(live_tab(10, 1, 0, "https://a.example/"))
            .with_tab(live_tab(11, 1, 1, "https://b.example/")),
    );
    let (engine, db_path) = new_engine("no-dups", Arc::clone(&host));

    let tabs = TabRepository::new(engine.store());
    tabs.insert(tab_record(
        UNASSIGNED_WORKSPACE_ID,
        Some(10),
        "https://a.example/",
    ))
    .unwrap();
    tabs.insert(tab_record(
        UNASSIGNED_WORKSPACE_ID,
        Some(11),
        "https://b.example/",
    ))
    .unwrap();

    let report = engine
        .clean_duplicate_tabs(UNASSIGNED_WORKSPACE_ID)
        .await
        .unwrap();
    assert_eq!(report.examined, 2);
    assert_eq!(report.closed, 0);
    assert_eq!(report.archived, 0);

    // With no candidates the pass never touches the host.
    assert!(host.calls().is_empty());

    let _ = std::fs::remove_file(db_path);
}

// ── Resource passes ──

#[tokio::test]
async fn resource_and_non_resource_passes_split_by_membership() {
    let host = Arc::new(
        InMemoryHost::new()
            .with_window(LiveWindow {
                id: 1,
                focused: true,
            })
            .with_tab(live_tab(10, 1, 0, "https://saved.example/"))
            .with_tab(live_tab(11, 1, 1, "https://unsaved.example/")),
    );
    let (engine, db_path) = new_engine("resource", host);

    let workspaces = WorkspaceRepository::new(engine.store());
    let workspace = workspaces.create("library", None).unwrap();
    let resources = ResourceRepository::new(engine.store());
    let group = resources.create_group("references").unwrap();
    resources
        .add_resource(group.id, "https://saved.example/", "Saved")
        .unwrap();
    workspaces
        .append_resource_group(workspace.id, group.id)
        .unwrap();

    let tabs = TabRepository::new(engine.store());
    let saved = tabs
        .insert(tab_record(workspace.id, Some(10), "https://saved.example/"))
        .unwrap();
    let unsaved = tabs
        .insert(tab_record(
            workspace.id,
            Some(11),
            "https://unsaved.example/",
        ))
        .unwrap();

    let resource_pass = engine.clean_resource_tabs(workspace.id).await.unwrap();
    assert_eq!(resource_pass.examined, 2);
    assert_eq!(resource_pass.archived, 1);
    assert_eq!(tabs.get(&saved.stable_id).unwrap().status, ItemStatus::Archived);
    assert_eq!(tabs.get(&unsaved.stable_id).unwrap().status, ItemStatus::Active);

    let non_resource_pass = engine.clean_non_resource_tabs(workspace.id).await.unwrap();
    assert_eq!(non_resource_pass.examined, 1);
    assert_eq!(non_resource_pass.archived, 1);
    assert_eq!(
        tabs.get(&unsaved.stable_id).unwrap().status,
        ItemStatus::Archived
    );

    let _ = std::fs::remove_file(db_path);
}

#[tokio::test]
async fn already_closed_live_items_are_skipped() {
    let host = Arc::new(
        InMemoryHost::new()
            .with_window(LiveWindow {
                id: 1,
                focused: true,
            })
            .with_tab(live_tab(1, 1, 0, ANCHOR_URL)),
    );
    let (engine, db_path) = new_engine("closed", Arc::clone(&host));

    // The record's live tab vanished between enumerations.
    let tabs = TabRepository::new(engine.store());
    let stale = tabs
        .insert(tab_record(
            UNASSIGNED_WORKSPACE_ID,
            Some(99),
            "https://gone.example/",
        ))
        .unwrap();
    set_updated_at(&engine, &stale.stable_id, now_ms() - 30 * DAY_MS);

    let report = engine
        .clean_unused_tabs(UNASSIGNED_WORKSPACE_ID, None)
        .await
        .unwrap();
    assert_eq!(report.closed, 0);
    assert_eq!(report.archived, 1);

    assert!(!host
        .calls()
        .iter()
        .any(|call| matches!(call, HostCall::CloseTabs(_))));
    assert_eq!(tabs.get(&stale.stable_id).unwrap().status, ItemStatus::Archived);

    let _ = std::fs::remove_file(db_path);
}
