use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use porthole_agent::{AgentSettings, ProcessManager};
use porthole_index::Database;
use porthole_journal::initial_jobs;
use porthole_types::{ProcessSnapshot, ProcessState, ServerMessage};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::bridge::TitleBridge;
use crate::broadcast::Broadcaster;
use crate::config::Config;
use crate::http;
use crate::prices::spawn_price_sync;
use crate::recompute::spawn_recompute_worker;
use crate::state::{AppState, StoreDirectory};
use crate::sync::spawn_ingest_worker;
use crate::watcher::spawn_watcher;
use crate::ws::ws_handler;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(http::health))
        .route("/api/projects", get(http::list_projects))
        .route(
            "/api/projects/{project_id}/sessions",
            get(http::list_sessions),
        )
        .route(
            "/api/projects/{project_id}/sessions/{session_id}",
            get(http::get_session)
                .patch(http::patch_session)
                .delete(http::delete_session),
        )
        .route(
            "/api/projects/{project_id}/sessions/{session_id}/items",
            get(http::list_items),
        )
        .route(
            "/api/projects/{project_id}/sessions/{session_id}/links",
            get(http::list_links),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Assemble every component and serve until ctrl-c.
pub async fn run(config: Config) -> Result<()> {
    info!(
        bind = %config.bind,
        journal_root = %config.journal_root.display(),
        db = %config.db_path.display(),
        "starting porthole"
    );

    let db = Arc::new(Mutex::new(
        Database::open(&config.db_path).context("open database")?,
    ));

    let agent_settings = AgentSettings {
        binary: config.agent_binary.clone(),
        ..AgentSettings::default()
    };
    let (manager, process_events) =
        ProcessManager::new(Arc::new(StoreDirectory(db.clone())), agent_settings);
    let _monitor = manager.spawn_timeout_monitor();

    let broadcaster = Broadcaster::new(256);
    let bridge = Arc::new(TitleBridge::new(config.journal_root.clone()));
    let (jobs_tx, jobs_rx) = tokio::sync::mpsc::unbounded_channel();

    let state = Arc::new(AppState {
        db: db.clone(),
        manager: manager.clone(),
        broadcaster: broadcaster.clone(),
        bridge: bridge.clone(),
        jobs: jobs_tx.clone(),
        journal_root: config.journal_root.clone(),
    });

    // Process lifecycle deltas fan out to clients, and safe transitions
    // flush any staged rename.
    let _pump = spawn_process_event_pump(state.clone(), process_events);

    // Catch up on whatever was appended while the server was down, then let
    // the watcher keep the queue fed.
    let catch_up = initial_jobs(&config.journal_root);
    info!(jobs = catch_up.len(), "startup journal scan");
    for job in catch_up {
        let _ = jobs_tx.send(job);
    }

    let _ingest = spawn_ingest_worker(state.clone(), jobs_rx);
    let _watcher = spawn_watcher(config.journal_root.clone(), jobs_tx.clone())
        .context("start journal watcher")?;
    let _prices = spawn_price_sync(db.clone(), config.prices_url.clone());
    let _recompute = spawn_recompute_worker(state.clone());

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("bind {}", config.bind))?;

    info!(bind = %config.bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(manager))
        .await
        .context("server error")?;

    Ok(())
}

fn spawn_process_event_pump(
    state: Arc<AppState>,
    mut events: tokio::sync::mpsc::UnboundedReceiver<ProcessSnapshot>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(snapshot) = events.recv().await {
            if matches!(snapshot.state, ProcessState::UserTurn | ProcessState::Dead)
                && let Err(e) = state.bridge.flush_for_session(&snapshot.session_id)
            {
                error!(
                    session_id = %snapshot.session_id,
                    error = %e,
                    "staged title flush failed"
                );
            }

            state
                .broadcaster
                .send(ServerMessage::ProcessState(snapshot));
        }
    })
}

async fn shutdown_signal(manager: Arc<ProcessManager>) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
    manager.shutdown().await;
}
