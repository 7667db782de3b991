use std::sync::Arc;
use std::time::Duration;

use porthole_engine::CURRENT_COMPUTE_VERSION;
use porthole_index::queries;
use porthole_journal::recompute_session;
use porthole_types::ServerMessage;
use tracing::{error, info};

use crate::state::AppState;

const SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Background recompute: sessions whose stored compute_version lags the
/// engine get a full batch re-derivation, one at a time.
pub fn spawn_recompute_worker(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            sweep(&state).await;
        }
    })
}

async fn sweep(state: &Arc<AppState>) {
    let lagging = {
        let db = state.db.lock().unwrap();
        match queries::session::list_lagging(db.conn(), CURRENT_COMPUTE_VERSION) {
            Ok(lagging) => lagging,
            Err(e) => {
                error!(error = %e, "recompute sweep query failed");
                return;
            }
        }
    };

    if lagging.is_empty() {
        return;
    }
    info!(sessions = lagging.len(), "recomputing lagging sessions");

    for session_id in lagging {
        let db = state.db.clone();
        let blocking_session = session_id.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut db = db.lock().unwrap();
            recompute_session(&mut db, &blocking_session)
        })
        .await;

        match result {
            Ok(Ok(Some(session))) => {
                state.broadcaster.send(ServerMessage::SessionUpdated {
                    session: session.to_payload(),
                });
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => error!(session_id, error = %e, "recompute failed"),
            Err(e) => error!(session_id, error = %e, "recompute task panicked"),
        }
    }
}
