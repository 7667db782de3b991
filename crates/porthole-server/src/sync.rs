use std::sync::Arc;

use porthole_journal::{sync_session, IngestOutcome, SyncJob};
use porthole_types::ServerMessage;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info};

use crate::state::AppState;

/// Drain the sync-job queue, one job at a time.
///
/// A single worker serializes all ingestion, which gives the per-session
/// ordering guarantee directly: deltas for a session are broadcast in the
/// order its journal grew. File and store work runs off the event loop.
pub fn spawn_ingest_worker(
    state: Arc<AppState>,
    mut jobs: UnboundedReceiver<SyncJob>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = jobs.recv().await {
            let db = state.db.clone();
            let blocking_job = job.clone();

            let outcome = tokio::task::spawn_blocking(move || {
                let mut db = db.lock().unwrap();
                sync_session(&mut db, &blocking_job)
            })
            .await;

            match outcome {
                Ok(Ok(Some(outcome))) => broadcast_outcome(&state, &job, outcome),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    // Offsets were not advanced; the next event retries.
                    error!(
                        session_id = %job.session_id,
                        error = %e,
                        "journal sync failed"
                    );
                }
                Err(e) => error!(error = %e, "ingest worker task panicked"),
            }
        }
    })
}

fn broadcast_outcome(state: &AppState, job: &SyncJob, outcome: IngestOutcome) {
    let session_payload = outcome.session.to_payload();

    if outcome.session_created {
        info!(session_id = %job.session_id, "session discovered");
        state.broadcaster.send(ServerMessage::SessionAdded {
            session: session_payload,
        });
    } else {
        state.broadcaster.send(ServerMessage::SessionUpdated {
            session: session_payload,
        });
    }

    if !outcome.items.is_empty() || !outcome.amended.is_empty() {
        state.broadcaster.send(ServerMessage::SessionItemsAdded {
            session_id: job.session_id.clone(),
            project_id: job.project_id.clone(),
            items: outcome.items.iter().map(|item| item.to_payload()).collect(),
            updated_metadata: outcome.amended,
        });
    }
}
