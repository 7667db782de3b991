use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use porthole_agent::{ProcessManager, SessionDirectory};
use porthole_index::{queries, Database};
use porthole_journal::SyncJob;
use tokio::sync::mpsc;

use crate::bridge::TitleBridge;
use crate::broadcast::Broadcaster;

/// Shared application state for all HTTP/WS handlers and background tasks.
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub manager: Arc<ProcessManager>,
    pub broadcaster: Broadcaster,
    pub bridge: Arc<TitleBridge>,
    pub jobs: mpsc::UnboundedSender<SyncJob>,
    pub journal_root: PathBuf,
}

/// The store-backed answer to "does this session already exist?", used by the
/// process manager to pick resume vs fresh-session launch.
pub struct StoreDirectory(pub Arc<Mutex<Database>>);

impl SessionDirectory for StoreDirectory {
    fn session_exists(&self, session_id: &str) -> bool {
        let db = self.0.lock().unwrap();
        queries::session::exists(db.conn(), session_id).unwrap_or(false)
    }
}
