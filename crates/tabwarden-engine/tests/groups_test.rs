#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Tab group synchronizer tests: lifecycle events and the startup sweep.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tabwarden_db::tab_group_repository::{NewTabGroup, TabGroupRepository};
use tabwarden_db::tab_repository::{NewTab, TabRepository};
use tabwarden_db::{Config, ItemStatus, Store, UNASSIGNED_WORKSPACE_ID};
use tabwarden_engine::groups::GroupEvent;
use tabwarden_engine::host::{LiveGroup, LiveWindow};
use tabwarden_engine::mock::{live_tab, InMemoryHost};
use tabwarden_engine::{Engine, EngineConfig};

static DB_SEQ: AtomicU64 = AtomicU64::new(0);

fn temp_db_path(tag: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let seq = DB_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut path = std::env::temp_dir();
    path.push(format!(
        "tabwarden-groups-{tag}-{seq}-{nanos}-{}.sqlite",
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

fn live_group(id: i64, title: &str) -> LiveGroup {
    LiveGroup {
        id,
        window_id: 1,
        title: title.to_string(),
        color: "blue".to_string(),
        collapsed: false,
    }
}

fn group_record(external_id: i64, title: &str) -> NewTabGroup {
    NewTabGroup {
        external_id: Some(external_id),
        window_id: 1,
        workspace_id: UNASSIGNED_WORKSPACE_ID,
        title: title.to_string(),
        color: "blue".to_string(),
        collapsed: false,
    }
}

fn member_record(url: &str, external_id: Option<i64>, group_id: Option<i64>) -> NewTab {
    NewTab {
        external_id,
        window_id: 1,
        group_id,
        workspace_id: UNASSIGNED_WORKSPACE_ID,
        tab_index: 0,
        url: url.to_string(),
        title: url.to_string(),
        pinned: false,
    }
}

// ── Lifecycle events ──

#[tokio::test]
async fn created_event_inserts_a_record() {
    let host = Arc::new(InMemoryHost::new());
    let (engine, db_path) = new_engine("created", host);

    engine
        .handle_group_event(GroupEvent::Created(live_group(7, "news")))
        .await
        .unwrap();

    let groups = TabGroupRepository::new(engine.store());
    let record = groups.find_active_by_external(7).unwrap().unwrap();
    assert_eq!(record.title, "news");
    assert_eq!(record.color, "blue");
    assert_eq!(record.workspace_id, UNASSIGNED_WORKSPACE_ID);
    assert_eq!(record.status, ItemStatus::Active);

    let _ = std::fs::remove_file(db_path);
}

#[tokio::test]
async fn updated_event_refreshes_fields() {
    let host = Arc::new(InMemoryHost::new());
    let (engine, db_path) = new_engine("updated", host);

    engine
        .handle_group_event(GroupEvent::Created(live_group(7, "news")))
        .await
        .unwrap();
    let groups = TabGroupRepository::new(engine.store());
    let created = groups.find_active_by_external(7).unwrap().unwrap();

    let mut changed = live_group(7, "headlines");
    changed.collapsed = true;
    engine
        .handle_group_event(GroupEvent::Updated(changed))
        .await
        .unwrap();

    let refreshed = groups.find_active_by_external(7).unwrap().unwrap();
    assert_eq!(refreshed.stable_id, created.stable_id);
    assert_eq!(refreshed.title, "headlines");
    assert!(refreshed.collapsed);

    let _ = std::fs::remove_file(db_path);
}

#[tokio::test]
async fn update_for_unknown_group_creates_a_record() {
    let host = Arc::new(InMemoryHost::new());
    let (engine, db_path) = new_engine("upsert", host);

    engine
        .handle_group_event(GroupEvent::Updated(live_group(7, "news")))
        .await
        .unwrap();

    let groups = TabGroupRepository::new(engine.store());
    assert!(groups.find_active_by_external(7).unwrap().is_some());

    let _ = std::fs::remove_file(db_path);
}

// ── Removal disambiguation ──

#[tokio::test]
async fn removal_with_active_members_deletes_record_and_orphans() {
    // Tab 20 is still open; tab 99 vanished with the group.
    let host = Arc::new(
        InMemoryHost::new()
            .with_window(LiveWindow {
                id: 1,
                focused: true,
            })
            .with_tab(live_tab(20, 1, 0, "https://kept.example/")),
    );
    let (engine, db_path) = new_engine("remove-active", Arc::clone(&host));

    let groups = TabGroupRepository::new(engine.store());
    let record = groups.insert(group_record(7, "news")).unwrap();
    let tabs = TabRepository::new(engine.store());
    let survivor = tabs
        .insert(member_record("https://kept.example/", Some(20), Some(7)))
        .unwrap();
    let orphan = tabs
        .insert(member_record("https://dead.example/", Some(99), Some(7)))
        .unwrap();

    engine
        .handle_group_event(GroupEvent::Removed { group_id: 7 })
        .await
        .unwrap();

    assert!(groups.get(&record.stable_id).is_err());
    assert!(tabs.get(&orphan.stable_id).is_err());
    let kept = tabs.get(&survivor.stable_id).unwrap();
    assert_eq!(kept.group_id, None);
    assert_eq!(kept.status, ItemStatus::Active);

    let _ = std::fs::remove_file(db_path);
}

#[tokio::test]
async fn removal_after_teardown_archives_record() {
    let host = Arc::new(InMemoryHost::new());
    let (engine, db_path) = new_engine("remove-archived", host);

    let groups = TabGroupRepository::new(engine.store());
    let record = groups.insert(group_record(7, "news")).unwrap();
    let tabs = TabRepository::new(engine.store());
    let member = tabs
        .insert(member_record("https://parked.example/", Some(20), Some(7)))
        .unwrap();
    tabs.archive_many(&[member.stable_id.clone()]).unwrap();

    engine
        .handle_group_event(GroupEvent::Removed { group_id: 7 })
        .await
        .unwrap();

    let kept = groups.get(&record.stable_id).unwrap();
    assert_eq!(kept.status, ItemStatus::Archived);
    assert!(groups.find_active_by_external(7).unwrap().is_none());

    let _ = std::fs::remove_file(db_path);
}

#[tokio::test]
async fn removal_with_no_members_deletes_record() {
    let host = Arc::new(InMemoryHost::new());
    let (engine, db_path) = new_engine("remove-empty", host);

    let groups = TabGroupRepository::new(engine.store());
    let record = groups.insert(group_record(7, "news")).unwrap();

    engine
        .handle_group_event(GroupEvent::Removed { group_id: 7 })
        .await
        .unwrap();

    assert!(groups.get(&record.stable_id).is_err());

    let _ = std::fs::remove_file(db_path);
}

#[tokio::test]
async fn removal_for_untracked_group_is_ignored() {
    let host = Arc::new(InMemoryHost::new());
    let (engine, db_path) = new_engine("remove-untracked", Arc::clone(&host));

    engine
        .handle_group_event(GroupEvent::Removed { group_id: 7 })
        .await
        .unwrap();

    let groups = TabGroupRepository::new(engine.store());
    assert!(groups.list_active().unwrap().is_empty());
    assert!(host.calls().is_empty());

    let _ = std::fs::remove_file(db_path);
}

// ── Startup sweep ──

#[tokio::test]
async fn startup_sync_upserts_and_archives() {
    let host = Arc::new(
        InMemoryHost::new()
            .with_window(LiveWindow {
                id: 1,
                focused: true,
            })
            .with_group(live_group(7, "news"))
            .with_group(live_group(8, "fresh")),
    );
    let (engine, db_path) = new_engine("startup", Arc::clone(&host));

    let groups = TabGroupRepository::new(engine.store());
    groups.insert(group_record(7, "olds")).unwrap();
    let stale = groups.insert(group_record(9, "stale")).unwrap();
    let tabs = TabRepository::new(engine.store());
    let member = tabs
        .insert(member_record("https://member.example/", Some(30), Some(9)))
        .unwrap();

    let report = engine.sync_groups_at_startup().await.unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.created, 1);
    assert_eq!(report.archived, 1);

    let renamed = groups.find_active_by_external(7).unwrap().unwrap();
    assert_eq!(renamed.title, "news");
    assert!(groups.find_active_by_external(8).unwrap().is_some());
    let archived = groups.get(&stale.stable_id).unwrap();
    assert_eq!(archived.status, ItemStatus::Archived);
    assert_eq!(tabs.get(&member.stable_id).unwrap().group_id, None);

    let _ = std::fs::remove_file(db_path);
}

#[tokio::test]
async fn startup_sync_is_idempotent() {
    let host = Arc::new(
        InMemoryHost::new()
            .with_window(LiveWindow {
                id: 1,
                focused: true,
            })
            .with_group(live_group(7, "news")),
    );
    let (engine, db_path) = new_engine("startup-idem", Arc::clone(&host));

    let first = engine.sync_groups_at_startup().await.unwrap();
    assert_eq!(first.created, 1);

    let second = engine.sync_groups_at_startup().await.unwrap();
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.archived, 0);

    let groups = TabGroupRepository::new(engine.store());
    assert_eq!(groups.list_active().unwrap().len(), 1);

    let _ = std::fs::remove_file(db_path);
}
