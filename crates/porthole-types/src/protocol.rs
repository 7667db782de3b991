use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::item::{ItemMetadata, ItemPayload};
use crate::process::ProcessSnapshot;

/// Inbound WebSocket control messages (client -> server).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum ClientMessage {
    SendMessage {
        session_id: String,
        project_id: String,
        text: String,
        #[serde(default)]
        images: Vec<ImageAttachment>,
        #[serde(default)]
        documents: Vec<DocumentAttachment>,
    },
    KillProcess {
        session_id: String,
    },
    PendingRequestResponse {
        session_id: String,
        request_id: String,
        #[serde(flatten)]
        response: PendingResponse,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "request_type")]
#[serde(rename_all = "snake_case")]
pub enum PendingResponse {
    ToolApproval {
        decision: ApprovalDecision,
        #[serde(default)]
        updated_input: Option<Value>,
        #[serde(default)]
        message: Option<String>,
    },
    AskUserQuestion {
        /// Question text -> chosen label or free text.
        answers: BTreeMap<String, String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageAttachment {
    pub media_type: String,
    /// Base64-encoded image bytes.
    pub data: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DocumentAttachment {
    pub media_type: String,
    /// Base64 for binary media types, raw text for text ones.
    pub data: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Serialized session row, shared by the REST surface and session deltas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPayload {
    pub id: String,
    pub project_id: String,
    pub title: Option<String>,
    pub archived: bool,
    pub pinned: bool,
    pub parent_session_id: Option<String>,
    pub session_type: String,
    pub message_count: i64,
    pub total_cost: Option<Decimal>,
    pub context_usage: Option<i64>,
    pub jsonl_git_branch: Option<String>,
    pub git_directory: Option<String>,
    pub git_branch: Option<String>,
    pub mtime: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Outbound WebSocket deltas (server -> client). Delivery is best-effort;
/// clients resynchronize over REST on reconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum ServerMessage {
    ActiveProcesses {
        processes: Vec<ProcessSnapshot>,
    },
    ProcessState(ProcessSnapshot),
    SessionItemsAdded {
        session_id: String,
        project_id: String,
        items: Vec<ItemPayload>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        updated_metadata: Vec<ItemMetadata>,
    },
    SessionAdded {
        session: SessionPayload,
    },
    SessionUpdated {
        session: SessionPayload,
    },
    SessionRemoved {
        /// The row as it was just before deletion, so clients can identify
        /// it the same way they do for added/updated deltas.
        session: SessionPayload,
    },
    Error {
        message: String,
    },
}
