use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of one agent subprocess.
///
/// `Starting` is the brief window between spawn and the init message that
/// confirms the session id. `Dead` is terminal; a new send creates a fresh
/// process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Starting,
    AssistantTurn,
    UserTurn,
    Dead,
}

impl ProcessState {
    /// Whether the subprocess may be writing its journal file right now.
    /// The rename bridge must not append while this is true.
    pub fn journal_write_unsafe(&self) -> bool {
        matches!(self, ProcessState::Starting | ProcessState::AssistantTurn)
    }
}

/// Why a process reached `Dead`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KillReason {
    Manual,
    IdleTimeout,
    ThinkingTimeout,
    Error,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingRequestKind {
    ToolApproval,
    AskUserQuestion,
}

/// A paused subprocess waiting on the user: either a permission approval or a
/// clarifying question. At most one per process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRequestInfo {
    pub request_id: String,
    pub request_type: PendingRequestKind,
    pub tool_name: String,
    pub tool_input: Value,
    pub created_at: DateTime<Utc>,
}

/// The user's answer to a pending request, ready to hand back to the CLI.
#[derive(Debug, Clone)]
pub enum PendingDecision {
    Allow { updated_input: Option<Value> },
    Deny { message: String },
}

/// Point-in-time view of one process, as broadcast in `process_state` deltas
/// and the `active_processes` snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub session_id: String,
    pub project_id: String,
    pub state: ProcessState,
    pub started_at: DateTime<Utc>,
    pub state_changed_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kill_reason: Option<KillReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_request: Option<PendingRequestInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_write_safety_by_state() {
        assert!(ProcessState::Starting.journal_write_unsafe());
        assert!(ProcessState::AssistantTurn.journal_write_unsafe());
        assert!(!ProcessState::UserTurn.journal_write_unsafe());
        assert!(!ProcessState::Dead.journal_write_unsafe());
    }

    #[test]
    fn snapshot_serializes_without_empty_optionals() {
        let snapshot = ProcessSnapshot {
            session_id: "s1".into(),
            project_id: "p1".into(),
            state: ProcessState::UserTurn,
            started_at: Utc::now(),
            state_changed_at: Utc::now(),
            last_activity: Utc::now(),
            error: None,
            kill_reason: None,
            pending_request: None,
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["state"], "user_turn");
        assert!(json.get("error").is_none());
        assert!(json.get("pending_request").is_none());
    }
}
