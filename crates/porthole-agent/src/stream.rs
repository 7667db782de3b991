//! The CLI's bidirectional stream-json contract: the message shapes read from
//! its stdout and the lines written to its stdin.

use std::path::PathBuf;
use std::process::Stdio;

use porthole_types::{DocumentAttachment, ImageAttachment, PendingDecision};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command;

/// The clarifying-question tool. A can_use_tool callback naming it is a
/// question for the user, not a permission check.
pub const QUESTION_TOOL: &str = "AskUserQuestion";

/// Messages the CLI emits on stdout. Only lifecycle matters here; content
/// events flow through the journal file, which is the authoritative copy.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum CliEvent {
    /// Session initialization; carries the confirmed session id.
    System {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    /// One assistant turn finished.
    Result {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        is_error: Option<bool>,
    },
    /// The CLI is blocked waiting for a decision from us.
    ControlRequest {
        request_id: String,
        request: ControlRequestBody,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlRequestBody {
    pub subtype: String,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub input: Option<Value>,
}

/// How to launch one CLI subprocess.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub binary: String,
    pub cwd: PathBuf,
    pub session_id: String,
    /// Resume an existing session vs start a fresh one under our chosen id.
    pub resume: bool,
}

pub fn build_command(spec: &LaunchSpec) -> Command {
    let mut cmd = Command::new(&spec.binary);

    cmd.args(["--input-format", "stream-json"]);
    cmd.args(["--output-format", "stream-json"]);
    cmd.arg("--verbose");
    cmd.args(["--permission-mode", "default"]);

    if spec.resume {
        cmd.args(["--resume", &spec.session_id]);
    } else {
        cmd.args(["--session-id", &spec.session_id]);
    }

    cmd.current_dir(&spec.cwd);
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    cmd
}

/// One stdin line carrying a user message: text plus optional image and
/// document blocks.
pub fn user_message_line(
    text: &str,
    images: &[ImageAttachment],
    documents: &[DocumentAttachment],
) -> String {
    let mut content = vec![json!({"type": "text", "text": text})];

    for image in images {
        content.push(json!({
            "type": "image",
            "source": {
                "type": "base64",
                "media_type": image.media_type,
                "data": image.data,
            },
        }));
    }

    for document in documents {
        let source = if document.media_type.starts_with("text/") {
            json!({"type": "text", "media_type": document.media_type, "data": document.data})
        } else {
            json!({"type": "base64", "media_type": document.media_type, "data": document.data})
        };
        content.push(json!({
            "type": "document",
            "source": source,
            "title": document.name,
        }));
    }

    json!({
        "type": "user",
        "message": {"role": "user", "content": content},
    })
    .to_string()
}

/// One stdin line answering a can_use_tool control request.
pub fn control_response_line(cli_request_id: &str, decision: &PendingDecision) -> String {
    let response = match decision {
        PendingDecision::Allow { updated_input } => match updated_input {
            Some(input) => json!({"behavior": "allow", "updatedInput": input}),
            None => json!({"behavior": "allow"}),
        },
        PendingDecision::Deny { message } => json!({"behavior": "deny", "message": message}),
    };

    json!({
        "type": "control_response",
        "response": {
            "subtype": "success",
            "request_id": cli_request_id,
            "response": response,
        },
    })
    .to_string()
}
