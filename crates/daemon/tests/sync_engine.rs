//! Change sync engine against a scripted remote and an in-memory store.

use std::sync::Arc;

use common::testkit::{deletion, remote_file, remote_folder, update, ScriptedRemote};
use common::{Blacklist, RemoteApi};
use nimbus_daemon::sync::{ChangeSyncEngine, SyncStatus};
use object_store::ObjectStore;

async fn setup(remote: Arc<ScriptedRemote>) -> (ChangeSyncEngine, ObjectStore) {
    let store = ObjectStore::in_memory(Blacklist::default()).await.unwrap();
    let engine = ChangeSyncEngine::new(remote as Arc<dyn RemoteApi>, store.clone(), 1000);
    (engine, store)
}

#[tokio::test]
async fn test_cold_sync_populates_tree_and_cursor() {
    let remote = Arc::new(ScriptedRemote::new());
    remote.set_root(remote_folder("root", "My Drive", ""));
    remote.push_page(
        vec![
            update(1, remote_folder("docs", "docs", "root")),
            update(2, remote_file("b", "b.txt", "root", 20)),
            deletion(3, "unrelated"),
        ],
        3,
    );

    let (engine, store) = setup(remote.clone()).await;
    engine.bootstrap_root().await.unwrap();
    let report = engine.run_once().await.unwrap();

    assert!(report.was_first_sync());
    assert_eq!(report.updated, 2);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.cursor, 4);
    assert_eq!(store.get_cursor().await.unwrap(), 4);

    let root_children: Vec<String> = store
        .list_children("root")
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.name)
        .collect();
    assert_eq!(root_children, vec!["b.txt", "docs"]);
    assert_eq!(store.find_child("root", "b.txt").await.unwrap().size, 20);
    assert_eq!(store.root().await.unwrap().name, "My Drive");

    // A cold sync asks for the whole history
    assert_eq!(remote.changes_calls()[0].start_change_id, None);
}

#[tokio::test]
async fn test_failure_on_second_page_keeps_cursor_until_resume() {
    let remote = Arc::new(ScriptedRemote::new());
    remote.push_page(
        (1..=1000)
            .map(|id| update(id, remote_file(&format!("f{id}"), &format!("{id}.bin"), "root", id)))
            .collect(),
        1005,
    );
    remote.push_page(
        (1001..=1005)
            .map(|id| update(id, remote_file(&format!("f{id}"), &format!("{id}.bin"), "root", id)))
            .collect(),
        1005,
    );
    remote.fail_page(1, 1);

    let (engine, store) = setup(remote.clone()).await;
    store.set_cursor(1).await.unwrap();

    let err = engine.run_once().await.unwrap_err();
    assert!(!err.is_auth());
    assert_eq!(store.get_cursor().await.unwrap(), 1);
    // The first page's entries are already visible
    assert_eq!(store.count().await.unwrap(), 1000);

    let report = engine.run_once().await.unwrap();
    assert_eq!(report.previous_cursor, 1);
    assert_eq!(report.cursor, 1006);
    assert_eq!(store.get_cursor().await.unwrap(), 1006);
    assert_eq!(store.count().await.unwrap(), 1005);

    // Re-applying page one was harmless
    assert_eq!(store.get("f500").await.unwrap().size, 500);

    let calls = remote.changes_calls();
    assert!(calls.iter().all(|c| c.start_change_id == Some(1)));
}

#[tokio::test]
async fn test_deletions_and_trash_remove_records() {
    let remote = Arc::new(ScriptedRemote::new());
    let mut trashed = remote_file("b", "b.txt", "root", 2);
    trashed.explicitly_trashed = true;
    remote.push_page(
        vec![
            update(1, remote_file("a", "a.txt", "root", 1)),
            update(2, remote_file("b", "b.txt", "root", 2)),
            deletion(3, "a"),
            update(4, trashed),
        ],
        4,
    );

    let (engine, store) = setup(remote).await;
    let report = engine.run_once().await.unwrap();

    assert_eq!(report.updated, 2);
    assert_eq!(report.deleted, 2);
    assert_eq!(store.count().await.unwrap(), 0);
    assert!(store.list_children("root").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unmappable_entries_are_skipped_without_blocking_cursor() {
    let remote = Arc::new(ScriptedRemote::new());
    let mut broken = remote_file("bad", "bad.txt", "root", 1);
    broken.modified_date = "yesterday-ish".to_string();
    remote.push_page(
        vec![
            update(7, broken),
            update(8, remote_file("good", "good.txt", "root", 1)),
        ],
        8,
    );

    let (engine, store) = setup(remote).await;
    let report = engine.run_once().await.unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(report.cursor, 9);
    assert!(store.get("bad").await.unwrap_err().is_not_found());
    assert!(store.get("good").await.is_ok());
}

#[tokio::test]
async fn test_empty_feed_never_moves_cursor_backwards() {
    let remote = Arc::new(ScriptedRemote::new());
    remote.push_page(vec![], 3);

    let (engine, store) = setup(remote).await;
    store.set_cursor(10).await.unwrap();

    let report = engine.run_once().await.unwrap();
    assert_eq!(report.cursor, 10);
    assert_eq!(store.get_cursor().await.unwrap(), 10);
}

#[tokio::test]
async fn test_status_channel_tracks_runs() {
    let remote = Arc::new(ScriptedRemote::new());
    remote.push_page(vec![update(1, remote_file("a", "a.txt", "root", 1))], 1);
    remote.fail_page(0, 1);

    let (engine, _store) = setup(remote).await;
    let status = engine.subscribe();
    assert_eq!(status.borrow().status, SyncStatus::Idle);

    engine.run_once().await.unwrap_err();
    assert!(matches!(status.borrow().status, SyncStatus::Failed(_)));

    engine.run_once().await.unwrap();
    let snapshot = status.borrow().clone();
    assert_eq!(snapshot.status, SyncStatus::Idle);
    assert_eq!(snapshot.last_report.map(|r| r.cursor), Some(2));
}

#[tokio::test]
async fn test_missing_root_is_an_error() {
    let remote = Arc::new(ScriptedRemote::new());
    let (engine, store) = setup(remote).await;

    assert!(engine.bootstrap_root().await.is_err());
    assert!(store.root_id().await.unwrap_err().is_not_found());
}
