//! One-line builders for journal events, returned as serialized JSONL lines.

use serde_json::json;

pub fn system_init_line(session_id: &str) -> String {
    json!({
        "type": "system",
        "subtype": "init",
        "session_id": session_id,
    })
    .to_string()
}

pub fn user_text_line(text: &str, timestamp: &str) -> String {
    json!({
        "type": "user",
        "message": {"role": "user", "content": text},
        "timestamp": timestamp,
    })
    .to_string()
}

pub fn assistant_text_line(message_id: &str, model: &str, text: &str, timestamp: &str) -> String {
    json!({
        "type": "assistant",
        "message": {
            "id": message_id,
            "model": model,
            "role": "assistant",
            "content": [{"type": "text", "text": text}],
        },
        "timestamp": timestamp,
    })
    .to_string()
}

/// Assistant line carrying usage, for cost/context derivation tests.
pub fn assistant_usage_line(
    message_id: &str,
    model: &str,
    input: u64,
    output: u64,
    cache_read: u64,
    cache_creation: u64,
    timestamp: &str,
) -> String {
    json!({
        "type": "assistant",
        "message": {
            "id": message_id,
            "model": model,
            "role": "assistant",
            "content": [{"type": "text", "text": "ok"}],
            "usage": {
                "input_tokens": input,
                "output_tokens": output,
                "cache_read_input_tokens": cache_read,
                "cache_creation_input_tokens": cache_creation,
                "cache_creation": {
                    "ephemeral_5m_input_tokens": cache_creation,
                    "ephemeral_1h_input_tokens": 0,
                },
            },
        },
        "timestamp": timestamp,
    })
    .to_string()
}

/// Assistant line whose content ends in a tool_use (suffix shape).
pub fn assistant_text_with_tool_use_line(
    message_id: &str,
    text: &str,
    tool_use_id: &str,
    tool_name: &str,
    input: serde_json::Value,
) -> String {
    json!({
        "type": "assistant",
        "message": {
            "id": message_id,
            "content": [
                {"type": "text", "text": text},
                {"type": "tool_use", "id": tool_use_id, "name": tool_name, "input": input},
            ],
        },
    })
    .to_string()
}

pub fn tool_use_line(
    message_id: &str,
    tool_use_id: &str,
    tool_name: &str,
    input: serde_json::Value,
) -> String {
    json!({
        "type": "assistant",
        "message": {
            "id": message_id,
            "content": [
                {"type": "tool_use", "id": tool_use_id, "name": tool_name, "input": input},
            ],
        },
    })
    .to_string()
}

pub fn tool_result_line(tool_use_id: &str, output: &str) -> String {
    json!({
        "type": "user",
        "message": {
            "role": "user",
            "content": [
                {"type": "tool_result", "tool_use_id": tool_use_id, "content": output},
            ],
        },
    })
    .to_string()
}

/// A Task tool_use spawning a subagent.
pub fn task_line(message_id: &str, tool_use_id: &str, prompt: &str) -> String {
    tool_use_line(
        message_id,
        tool_use_id,
        "Task",
        json!({"prompt": prompt, "subagent_type": "general-purpose"}),
    )
}

pub fn custom_title_line(title: &str) -> String {
    json!({"type": "custom-title", "customTitle": title}).to_string()
}
