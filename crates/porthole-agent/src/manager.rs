use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use porthole_types::{
    DocumentAttachment, ImageAttachment, KillReason, PendingDecision, ProcessSnapshot,
    ProcessState,
};
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::process::AgentProcess;
use crate::stream::LaunchSpec;

/// The one store question the manager asks: does a session row exist?
/// Existing sessions are resumed; unknown ones start fresh under our id.
pub trait SessionDirectory: Send + Sync {
    fn session_exists(&self, session_id: &str) -> bool;
}

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub binary: String,
    pub idle_timeout: Duration,
    pub thinking_timeout: Duration,
    pub monitor_interval: Duration,
    pub shutdown_grace: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            binary: "claude".to_string(),
            idle_timeout: Duration::from_secs(15 * 60),
            thinking_timeout: Duration::from_secs(60 * 60),
            monitor_interval: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Registry of live agent processes, one per session.
///
/// State-change notifications flow through the channel handed out at
/// construction; nothing called from inside a process ever re-enters the
/// registry lock.
pub struct ProcessManager {
    processes: Mutex<HashMap<String, Arc<AgentProcess>>>,
    events: mpsc::UnboundedSender<ProcessSnapshot>,
    directory: Arc<dyn SessionDirectory>,
    settings: AgentSettings,
}

impl ProcessManager {
    pub fn new(
        directory: Arc<dyn SessionDirectory>,
        settings: AgentSettings,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ProcessSnapshot>) {
        let (events, rx) = mpsc::unbounded_channel();
        let manager = Arc::new(Self {
            processes: Mutex::new(HashMap::new()),
            events,
            directory,
            settings,
        });
        (manager, rx)
    }

    /// Route user input to the session's process, creating one when none is
    /// alive. Resume vs fresh-session is decided by the store directory.
    pub async fn send(
        &self,
        session_id: &str,
        project_id: &str,
        cwd: PathBuf,
        text: &str,
        images: &[ImageAttachment],
        documents: &[DocumentAttachment],
    ) -> anyhow::Result<()> {
        let mut processes = self.processes.lock().await;

        if let Some(existing) = processes.get(session_id) {
            if existing.state() != ProcessState::Dead {
                let existing = existing.clone();
                drop(processes);
                return existing.send(text, images, documents).await;
            }
            processes.remove(session_id);
        }

        let resume = self.directory.session_exists(session_id);
        let spec = LaunchSpec {
            binary: self.settings.binary.clone(),
            cwd,
            session_id: session_id.to_string(),
            resume,
        };

        info!(session_id, resume, "starting agent process");
        let process = AgentProcess::launch(
            session_id.to_string(),
            project_id.to_string(),
            spec,
            text,
            images,
            documents,
            self.events.clone(),
        )
        .await;

        processes.insert(session_id.to_string(), process);
        Ok(())
    }

    /// Kill a session's process. Returns false when none is alive.
    pub async fn kill(&self, session_id: &str, reason: KillReason) -> bool {
        let process = {
            let processes = self.processes.lock().await;
            processes.get(session_id).cloned()
        };

        match process {
            Some(process) => {
                process.kill(reason).await;
                true
            }
            None => false,
        }
    }

    /// Deliver a pending-request response. Idempotent: unknown sessions,
    /// stale request ids, and already-resolved requests are all no-ops.
    pub async fn resolve_pending(
        &self,
        session_id: &str,
        request_id: &str,
        decision: PendingDecision,
    ) -> bool {
        let process = {
            let processes = self.processes.lock().await;
            processes.get(session_id).cloned()
        };

        match process {
            Some(process) => process.resolve_pending(request_id, decision),
            None => false,
        }
    }

    /// All current process records, for the connect-time snapshot.
    pub async fn snapshot(&self) -> Vec<ProcessSnapshot> {
        let processes = self.processes.lock().await;
        let mut records: Vec<_> = processes.values().map(|p| p.snapshot()).collect();
        records.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        records
    }

    /// Current state of one session's process, if any. The rename bridge
    /// consults this for write safety.
    pub async fn process_state(&self, session_id: &str) -> Option<ProcessState> {
        let processes = self.processes.lock().await;
        processes.get(session_id).map(|p| p.state())
    }

    /// Periodic sweep: enforce turn timeouts and drop dead records.
    pub fn spawn_timeout_monitor(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(manager.settings.monitor_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                manager.sweep().await;
            }
        })
    }

    async fn sweep(&self) {
        let now = chrono::Utc::now();
        let observed: Vec<(String, Arc<AgentProcess>)> = {
            let processes = self.processes.lock().await;
            processes
                .iter()
                .map(|(id, p)| (id.clone(), p.clone()))
                .collect()
        };

        for (session_id, process) in &observed {
            let snapshot = process.snapshot();
            let state_age = (now - snapshot.state_changed_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            let idle_age = (now - snapshot.last_activity)
                .to_std()
                .unwrap_or(Duration::ZERO);

            match snapshot.state {
                ProcessState::UserTurn if idle_age > self.settings.idle_timeout => {
                    warn!(session_id, "user-turn idle timeout");
                    process.kill(KillReason::IdleTimeout).await;
                }
                // A process parked on a pending request is waiting on the
                // user, not thinking; it is exempt.
                ProcessState::AssistantTurn | ProcessState::Starting
                    if state_age > self.settings.thinking_timeout
                        && !process.has_pending_request() =>
                {
                    warn!(session_id, "assistant-turn thinking timeout");
                    process.kill(KillReason::ThinkingTimeout).await;
                }
                _ => {}
            }
        }

        // Remove records that are dead now. The identity check keeps a
        // just-recreated process under the same session id safe.
        let mut processes = self.processes.lock().await;
        for (session_id, observed_process) in observed {
            if observed_process.state() == ProcessState::Dead
                && let Some(current) = processes.get(&session_id)
                && Arc::ptr_eq(current, &observed_process)
            {
                processes.remove(&session_id);
            }
        }
    }

    /// Kill everything, then wait a bounded time for children to be reaped.
    pub async fn shutdown(&self) {
        let all: Vec<Arc<AgentProcess>> = {
            let processes = self.processes.lock().await;
            processes.values().cloned().collect()
        };

        info!(count = all.len(), "shutting down agent processes");
        for process in &all {
            process.kill(KillReason::Shutdown).await;
        }
        for process in &all {
            process.wait_exit(self.settings.shutdown_grace).await;
        }
    }
}
