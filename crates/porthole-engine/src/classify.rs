use porthole_types::{
    AssistantContent, DisplayLevel, ItemKind, JournalRecord, TokenUsage, UserContent,
};
use serde_json::Value;

/// A tool invocation block lifted out of a journal line.
#[derive(Debug, Clone)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// A tool_result block, reduced to what link derivation needs.
#[derive(Debug, Clone)]
pub struct ToolResultRef {
    pub tool_use_id: String,
    pub agent_id: Option<String>,
}

/// Everything classification extracts from one raw journal line.
///
/// Parse failures never abort ingestion: the line becomes a debug-only
/// `Unknown` item with no derivations.
#[derive(Debug, Clone)]
pub struct Classified {
    pub kind: ItemKind,
    pub display_level: DisplayLevel,
    /// The line's content begins with tool_result blocks: as an `always` item
    /// it attaches back to the open collapsible group.
    pub leads_with_tool_result: bool,
    /// The line's content ends with tool_use blocks: as an `always` item it
    /// opens a pseudo-group for the results that follow.
    pub trails_with_tool_use: bool,
    pub message_id: Option<String>,
    pub model: Option<String>,
    pub usage: Option<TokenUsage>,
    pub timestamp: Option<String>,
    pub cwd: Option<String>,
    pub jsonl_git_branch: Option<String>,
    pub is_sidechain: bool,
    pub record_agent_id: Option<String>,
    pub tool_uses: Vec<ToolUseBlock>,
    pub tool_results: Vec<ToolResultRef>,
    /// First text block of a user message (Task prompt matching, titles).
    pub user_text: Option<String>,
}

impl Classified {
    fn empty(kind: ItemKind) -> Self {
        Classified {
            kind,
            display_level: DisplayLevel::DebugOnly,
            leads_with_tool_result: false,
            trails_with_tool_use: false,
            message_id: None,
            model: None,
            usage: None,
            timestamp: None,
            cwd: None,
            jsonl_git_branch: None,
            is_sidechain: false,
            record_agent_id: None,
            tool_uses: Vec::new(),
            tool_results: Vec::new(),
            user_text: None,
        }
    }
}

pub fn classify(raw: &str) -> Classified {
    let record: JournalRecord = match serde_json::from_str(raw) {
        Ok(record) => record,
        Err(_) => return Classified::empty(ItemKind::Unknown),
    };

    match record {
        JournalRecord::System(system) => {
            let mut c = Classified::empty(match system.subtype.as_deref() {
                Some("init") => ItemKind::SystemInit,
                _ => ItemKind::Meta,
            });
            c.timestamp = system.timestamp;
            c
        }
        JournalRecord::CustomTitle(_) => Classified::empty(ItemKind::CustomTitle),
        JournalRecord::Summary(_) => Classified::empty(ItemKind::Summary),
        JournalRecord::Unknown => Classified::empty(ItemKind::Unknown),
        JournalRecord::User(user) => {
            let mut c = Classified::empty(ItemKind::UserMessage);
            c.timestamp = user.timestamp.clone();
            c.cwd = user.cwd.clone();
            c.jsonl_git_branch = user.git_branch.clone();
            c.is_sidechain = user.is_sidechain;
            c.record_agent_id = user.agent_id.clone();

            let content = &user.message.content;
            for block in content {
                match block {
                    UserContent::ToolResult {
                        tool_use_id,
                        agent_id,
                        ..
                    } => c.tool_results.push(ToolResultRef {
                        tool_use_id: tool_use_id.clone(),
                        agent_id: agent_id.clone(),
                    }),
                    UserContent::Text { text } => {
                        if c.user_text.is_none() {
                            c.user_text = Some(text.clone());
                        }
                    }
                    _ => {}
                }
            }

            let has_text = content
                .iter()
                .any(|b| matches!(b, UserContent::Text { .. }));
            let has_image = content
                .iter()
                .any(|b| matches!(b, UserContent::Image { .. }));
            let has_tool_result = !c.tool_results.is_empty();

            if user.is_meta {
                c.kind = ItemKind::Meta;
                c.display_level = DisplayLevel::DebugOnly;
            } else if has_text || has_image {
                c.kind = ItemKind::UserMessage;
                c.display_level = DisplayLevel::Always;
                c.leads_with_tool_result =
                    matches!(content.first(), Some(UserContent::ToolResult { .. }));
            } else if has_tool_result {
                c.kind = ItemKind::ToolResult;
                c.display_level = DisplayLevel::Collapsible;
            } else {
                c.kind = ItemKind::UserMessage;
                c.display_level = DisplayLevel::DebugOnly;
            }
            c
        }
        JournalRecord::Assistant(asst) => {
            let mut c = Classified::empty(ItemKind::AssistantMessage);
            c.timestamp = asst.timestamp.clone();
            c.cwd = asst.cwd.clone();
            c.jsonl_git_branch = asst.git_branch.clone();
            c.is_sidechain = asst.is_sidechain;
            c.record_agent_id = asst.agent_id.clone();
            c.message_id = asst.message.id.clone();
            c.model = asst.message.model.clone();
            c.usage = asst.message.usage.clone();

            let content = &asst.message.content;
            for block in content {
                if let AssistantContent::ToolUse { id, name, input } = block {
                    c.tool_uses.push(ToolUseBlock {
                        id: id.clone(),
                        name: name.clone(),
                        input: input.clone(),
                    });
                }
            }

            let has_text = content
                .iter()
                .any(|b| matches!(b, AssistantContent::Text { .. }));
            let has_tool_use = !c.tool_uses.is_empty();
            let has_thinking = content
                .iter()
                .any(|b| matches!(b, AssistantContent::Thinking { .. }));

            if has_text {
                c.kind = ItemKind::AssistantMessage;
                c.display_level = DisplayLevel::Always;
                c.trails_with_tool_use =
                    matches!(content.last(), Some(AssistantContent::ToolUse { .. }));
            } else if has_tool_use {
                c.kind = ItemKind::ToolUse;
                c.display_level = DisplayLevel::Collapsible;
            } else if has_thinking {
                c.kind = ItemKind::Thinking;
                c.display_level = DisplayLevel::DebugOnly;
            } else {
                c.kind = ItemKind::AssistantMessage;
                c.display_level = DisplayLevel::DebugOnly;
            }
            c
        }
    }
}
