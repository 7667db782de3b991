use std::sync::{Arc, Mutex};
use std::time::Duration;

use porthole_agent::{AgentSettings, ProcessManager};
use porthole_index::Database;
use porthole_journal::SyncJob;
use porthole_server::{spawn_watcher, AppState, Broadcaster, TitleBridge};
use porthole_testing::{tool_use_line, user_text_line, JournalWorld};
use porthole_types::ServerMessage;
use serde_json::json;

async fn recv_job(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<SyncJob>,
    within: Duration,
) -> Option<SyncJob> {
    tokio::time::timeout(within, rx.recv()).await.ok().flatten()
}

#[tokio::test(flavor = "multi_thread")]
async fn watcher_emits_separate_jobs_for_concurrently_updated_sessions() {
    let world = JournalWorld::new().unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _watcher = spawn_watcher(world.root().to_path_buf(), tx).unwrap();

    // Two sessions change within a few milliseconds of each other.
    world
        .append("p1", "s1", &[user_text_line("one", "2026-01-22T10:00:00Z")])
        .unwrap();
    world
        .append("p2", "s2", &[user_text_line("two", "2026-01-22T10:00:00Z")])
        .unwrap();

    let mut seen = Vec::new();
    while seen.len() < 2 {
        match recv_job(&mut rx, Duration::from_secs(10)).await {
            Some(job) => seen.push((job.project_id, job.session_id)),
            None => panic!("watcher produced {} of 2 expected jobs", seen.len()),
        }
    }

    seen.sort();
    assert_eq!(
        seen,
        vec![
            ("p1".to_string(), "s1".to_string()),
            ("p2".to_string(), "s2".to_string()),
        ]
    );

    // The burst was debounced: no duplicate jobs trailing behind.
    assert!(recv_job(&mut rx, Duration::from_millis(900)).await.is_none());
}

fn test_state(world: &JournalWorld) -> (Arc<AppState>, tokio::sync::mpsc::UnboundedReceiver<SyncJob>) {
    let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
    let (manager, _events) = ProcessManager::new(
        Arc::new(porthole_server::StoreDirectory(db.clone())),
        AgentSettings::default(),
    );
    let broadcaster = Broadcaster::new(64);
    let bridge = Arc::new(TitleBridge::new(world.root().to_path_buf()));
    let (jobs_tx, jobs_rx) = tokio::sync::mpsc::unbounded_channel();

    let state = Arc::new(AppState {
        db,
        manager,
        broadcaster,
        bridge,
        jobs: jobs_tx,
        journal_root: world.root().to_path_buf(),
    });
    (state, jobs_rx)
}

#[tokio::test(flavor = "multi_thread")]
async fn ingest_worker_broadcasts_session_and_item_deltas() {
    let world = JournalWorld::new().unwrap();
    let (state, jobs_rx) = test_state(&world);
    let mut deltas = state.broadcaster.subscribe();
    let _worker = porthole_server::spawn_ingest_worker(state.clone(), jobs_rx);

    let path = world
        .append(
            "p1",
            "s1",
            &[
                user_text_line("inspect", "2026-01-22T10:00:00Z"),
                tool_use_line("msg_1", "toolu_1", "Bash", json!({"command": "ls"})),
            ],
        )
        .unwrap();

    state
        .jobs
        .send(SyncJob {
            project_id: "p1".into(),
            session_id: "s1".into(),
            path,
        })
        .unwrap();

    let added = tokio::time::timeout(Duration::from_secs(5), deltas.recv())
        .await
        .unwrap()
        .unwrap();
    let ServerMessage::SessionAdded { session } = added else {
        panic!("expected session_added, got {added:?}");
    };
    assert_eq!(session.id, "s1");

    let items = tokio::time::timeout(Duration::from_secs(5), deltas.recv())
        .await
        .unwrap()
        .unwrap();
    let ServerMessage::SessionItemsAdded {
        session_id, items, ..
    } = items
    else {
        panic!("expected session_items_added, got {items:?}");
    };
    assert_eq!(session_id, "s1");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].line_num, 1);
}
