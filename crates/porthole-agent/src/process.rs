use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use porthole_types::{
    DocumentAttachment, ImageAttachment, KillReason, PendingDecision, PendingRequestInfo,
    PendingRequestKind, ProcessSnapshot, ProcessState,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::stream::{
    build_command, control_response_line, user_message_line, CliEvent, LaunchSpec, QUESTION_TOOL,
};

pub(crate) type StateSink = mpsc::UnboundedSender<ProcessSnapshot>;

struct PendingSlot {
    info: PendingRequestInfo,
    tx: oneshot::Sender<PendingDecision>,
}

struct Inner {
    state: ProcessState,
    state_changed_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    error: Option<String>,
    kill_reason: Option<KillReason>,
    pending: Option<PendingSlot>,
}

/// One supervised CLI subprocess, bound to one session.
///
/// The wrapper tracks lifecycle only; message content reaches the view layer
/// through the journal file on disk. All failure paths converge on the
/// terminal `Dead` state; nothing here raises past the constructor.
pub struct AgentProcess {
    session_id: String,
    project_id: String,
    started_at: DateTime<Utc>,
    inner: Mutex<Inner>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    child: tokio::sync::Mutex<Option<Child>>,
    events: StateSink,
}

impl AgentProcess {
    /// Spawn the subprocess and feed it the opening prompt. Launch failure
    /// becomes a `Dead` record with the error attached; it never raises.
    pub async fn launch(
        session_id: String,
        project_id: String,
        spec: LaunchSpec,
        prompt: &str,
        images: &[ImageAttachment],
        documents: &[DocumentAttachment],
        events: StateSink,
    ) -> Arc<Self> {
        let now = Utc::now();
        let process = Arc::new(Self {
            session_id,
            project_id,
            started_at: now,
            inner: Mutex::new(Inner {
                state: ProcessState::Starting,
                state_changed_at: now,
                last_activity: now,
                error: None,
                kill_reason: None,
                pending: None,
            }),
            stdin: tokio::sync::Mutex::new(None),
            child: tokio::sync::Mutex::new(None),
            events,
        });

        let mut child = match build_command(&spec).spawn() {
            Ok(child) => child,
            Err(e) => {
                process.fail(format!("failed to launch {}: {}", spec.binary, e));
                return process;
            }
        };

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        *process.stdin.lock().await = stdin;
        *process.child.lock().await = Some(child);

        process.emit();

        if let Some(stderr) = stderr {
            let session = process.session_id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(session_id = %session, line = %line, "agent stderr");
                }
            });
        }

        match stdout {
            Some(stdout) => {
                let loop_process = process.clone();
                tokio::spawn(async move {
                    loop_process.message_loop(stdout).await;
                });
            }
            None => process.fail("subprocess stdout was not captured".to_string()),
        }

        if let Err(e) = process
            .write_line(&user_message_line(prompt, images, documents))
            .await
        {
            process.fail(format!("failed to write initial prompt: {e}"));
            if let Some(child) = process.child.lock().await.as_mut() {
                let _ = child.start_kill();
            }
        }

        process
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Forward new user input. Transitions user-turn into assistant-turn;
    /// input sent mid-turn is queued by the CLI and changes nothing here.
    pub async fn send(
        &self,
        text: &str,
        images: &[ImageAttachment],
        documents: &[DocumentAttachment],
    ) -> anyhow::Result<()> {
        self.write_line(&user_message_line(text, images, documents))
            .await
            .map_err(|e| {
                self.fail(format!("failed to write to subprocess: {e}"));
                anyhow::anyhow!("session {}: {e}", self.session_id)
            })?;

        {
            let mut inner = self.inner.lock().unwrap();
            inner.last_activity = Utc::now();
            if inner.state == ProcessState::UserTurn {
                inner.state = ProcessState::AssistantTurn;
                inner.state_changed_at = Utc::now();
            }
        }
        self.emit();

        Ok(())
    }

    /// Terminate the subprocess. Cancels any outstanding pending-request
    /// rendez-vous so no waiter dangles.
    pub async fn kill(&self, reason: KillReason) {
        let already_dead = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state == ProcessState::Dead {
                true
            } else {
                inner.kill_reason = Some(reason);
                inner.state = ProcessState::Dead;
                inner.state_changed_at = Utc::now();
                // Dropping the sender wakes the rendez-vous with an error.
                inner.pending = None;
                false
            }
        };

        if already_dead {
            return;
        }

        if let Some(child) = self.child.lock().await.as_mut()
            && let Err(e) = child.start_kill()
        {
            warn!(session_id = %self.session_id, error = %e, "kill signal failed");
        }

        self.emit();
    }

    /// Deliver the user's answer to the blocked rendez-vous. No-op unless the
    /// given request id matches the one outstanding request.
    pub fn resolve_pending(&self, request_id: &str, decision: PendingDecision) -> bool {
        let slot = {
            let mut inner = self.inner.lock().unwrap();
            match &inner.pending {
                Some(slot) if slot.info.request_id == request_id => inner.pending.take(),
                _ => None,
            }
        };

        match slot {
            Some(slot) => {
                // The loop side may have died between check and send; that is
                // still a resolved (cancelled) request.
                let _ = slot.tx.send(decision);
                true
            }
            None => false,
        }
    }

    pub fn state(&self) -> ProcessState {
        self.inner.lock().unwrap().state
    }

    pub fn has_pending_request(&self) -> bool {
        self.inner.lock().unwrap().pending.is_some()
    }

    pub fn snapshot(&self) -> ProcessSnapshot {
        let inner = self.inner.lock().unwrap();
        ProcessSnapshot {
            session_id: self.session_id.clone(),
            project_id: self.project_id.clone(),
            state: inner.state,
            started_at: self.started_at,
            state_changed_at: inner.state_changed_at,
            last_activity: inner.last_activity,
            error: inner.error.clone(),
            kill_reason: inner.kill_reason,
            pending_request: inner.pending.as_ref().map(|slot| slot.info.clone()),
        }
    }

    /// Block until the subprocess is reaped, or give up after `wait`.
    pub async fn wait_exit(&self, wait: std::time::Duration) {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if self.child.lock().await.is_none() {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }
    }

    fn emit(&self) {
        let _ = self.events.send(self.snapshot());
    }

    /// Record a fatal error and converge on Dead.
    fn fail(&self, message: String) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state == ProcessState::Dead {
                return;
            }
            inner.state = ProcessState::Dead;
            inner.state_changed_at = Utc::now();
            inner.error = Some(message.clone());
            if inner.kill_reason.is_none() {
                inner.kill_reason = Some(KillReason::Error);
            }
            inner.pending = None;
        }
        warn!(session_id = %self.session_id, error = %message, "agent process failed");
        self.emit();
    }

    async fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut guard = self.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            return Err(std::io::Error::other("stdin closed"));
        };
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Consume the subprocess output stream until EOF, driving the state
    /// machine. Runs as one background task per process.
    async fn message_loop(self: Arc<Self>, stdout: tokio::process::ChildStdout) {
        let mut lines = BufReader::new(stdout).lines();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    self.fail(format!("subprocess stream error: {e}"));
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let event: CliEvent = match serde_json::from_str(&line) {
                Ok(event) => event,
                Err(_) => continue,
            };

            match event {
                CliEvent::System { subtype, session_id } => {
                    if subtype.as_deref() == Some("init") {
                        if let Some(confirmed) = session_id
                            && confirmed != self.session_id
                        {
                            warn!(
                                expected = %self.session_id,
                                confirmed = %confirmed,
                                "subprocess confirmed a different session id"
                            );
                        }
                        let changed = {
                            let mut inner = self.inner.lock().unwrap();
                            inner.last_activity = Utc::now();
                            if inner.state == ProcessState::Starting {
                                inner.state = ProcessState::AssistantTurn;
                                inner.state_changed_at = Utc::now();
                                true
                            } else {
                                false
                            }
                        };
                        if changed {
                            self.emit();
                        }
                    }
                }
                CliEvent::Result { .. } => {
                    let changed = {
                        let mut inner = self.inner.lock().unwrap();
                        inner.last_activity = Utc::now();
                        if inner.state == ProcessState::AssistantTurn
                            || inner.state == ProcessState::Starting
                        {
                            inner.state = ProcessState::UserTurn;
                            inner.state_changed_at = Utc::now();
                            true
                        } else {
                            false
                        }
                    };
                    if changed {
                        self.emit();
                    }
                }
                CliEvent::ControlRequest {
                    request_id: cli_request_id,
                    request,
                } => {
                    if request.subtype != "can_use_tool" {
                        continue;
                    }
                    self.handle_pending_request(&cli_request_id, request).await;
                }
                CliEvent::Other => {}
            }
        }

        // EOF or stream error: reap the child and make death observable if
        // nothing else already did.
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.wait().await;
        }
        if self.state() != ProcessState::Dead {
            self.fail("subprocess exited unexpectedly".to_string());
        }
    }

    async fn handle_pending_request(
        self: &Arc<Self>,
        cli_request_id: &str,
        request: crate::stream::ControlRequestBody,
    ) {
        let tool_name = request.tool_name.unwrap_or_else(|| "unknown".to_string());
        let request_type = if tool_name == QUESTION_TOOL {
            PendingRequestKind::AskUserQuestion
        } else {
            PendingRequestKind::ToolApproval
        };

        let (tx, rx) = oneshot::channel();
        let info = PendingRequestInfo {
            request_id: Uuid::new_v4().to_string(),
            request_type,
            tool_name,
            tool_input: request.input.unwrap_or(serde_json::Value::Null),
            created_at: Utc::now(),
        };

        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state == ProcessState::Dead {
                return;
            }
            inner.pending = Some(PendingSlot {
                info: info.clone(),
                tx,
            });
        }
        self.emit();

        // Rendez-vous: parked here until resolve_pending fires or the
        // process dies (sender dropped).
        match rx.await {
            Ok(decision) => {
                if let Err(e) = self
                    .write_line(&control_response_line(cli_request_id, &decision))
                    .await
                {
                    self.fail(format!("failed to answer control request: {e}"));
                    return;
                }
                {
                    let mut inner = self.inner.lock().unwrap();
                    inner.last_activity = Utc::now();
                }
                self.emit();
            }
            Err(_) => {
                debug!(
                    session_id = %self.session_id,
                    "pending request cancelled by process death"
                );
            }
        }
    }
}
