use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::time::{Duration, Instant};

use anyhow::Result;
use notify::{Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use porthole_journal::{journal_ref, SyncJob};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// How long a path must be quiet before its sync job is dispatched. Bursts of
/// writes to the same journal collapse into one job.
const DEBOUNCE_WINDOW: Duration = Duration::from_millis(200);

pub struct JournalWatcher {
    _watcher: PollWatcher,
    _handle: std::thread::JoinHandle<()>,
}

/// Watch the journal root recursively and turn file events into debounced
/// sync jobs. The watcher never reads file contents; it only dispatches.
pub fn spawn_watcher(root: PathBuf, jobs: UnboundedSender<SyncJob>) -> Result<JournalWatcher> {
    let (tx_fs, rx_fs) = channel();

    let config = notify::Config::default().with_poll_interval(Duration::from_millis(500));
    let mut watcher = PollWatcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx_fs.send(event);
            }
        },
        config,
    )?;

    std::fs::create_dir_all(&root)?;
    watcher.watch(&root, RecursiveMode::Recursive)?;

    let handle = std::thread::Builder::new()
        .name("journal-watcher".to_string())
        .spawn(move || {
            let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

            loop {
                match rx_fs.recv_timeout(Duration::from_millis(50)) {
                    Ok(event) => {
                        if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                            let now = Instant::now();
                            for path in event.paths {
                                if journal_ref(&root, &path).is_some() {
                                    pending.insert(path, now);
                                }
                            }
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }

                for path in take_quiet(&mut pending, Instant::now(), DEBOUNCE_WINDOW) {
                    let Some(journal) = journal_ref(&root, &path) else {
                        continue;
                    };
                    debug!(path = %path.display(), "journal changed");
                    let job = SyncJob {
                        project_id: journal.project_id,
                        session_id: journal.session_id,
                        path: journal.path,
                    };
                    if jobs.send(job).is_err() {
                        warn!("ingest queue closed; stopping watcher");
                        return;
                    }
                }
            }
        })?;

    Ok(JournalWatcher {
        _watcher: watcher,
        _handle: handle,
    })
}

/// Paths whose last event is older than the debounce window, removed from the
/// pending set.
fn take_quiet(
    pending: &mut HashMap<PathBuf, Instant>,
    now: Instant,
    window: Duration,
) -> Vec<PathBuf> {
    let quiet: Vec<PathBuf> = pending
        .iter()
        .filter(|&(_, &last)| now.duration_since(last) >= window)
        .map(|(path, _)| path.clone())
        .collect();

    for path in &quiet {
        pending.remove(path);
    }
    quiet
}
