use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How a journal item renders in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayLevel {
    /// Hidden unless the debug toggle is on.
    DebugOnly,
    /// Folded into an expandable group.
    Collapsible,
    /// Always visible; may bookend a collapsible group.
    Always,
}

impl DisplayLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayLevel::DebugOnly => "debug_only",
            DisplayLevel::Collapsible => "collapsible",
            DisplayLevel::Always => "always",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debug_only" => Some(DisplayLevel::DebugOnly),
            "collapsible" => Some(DisplayLevel::Collapsible),
            "always" => Some(DisplayLevel::Always),
            _ => None,
        }
    }
}

/// What a journal line is, once classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    UserMessage,
    AssistantMessage,
    ToolUse,
    ToolResult,
    Thinking,
    SystemInit,
    CustomTitle,
    Summary,
    Meta,
    Unknown,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::UserMessage => "user_message",
            ItemKind::AssistantMessage => "assistant_message",
            ItemKind::ToolUse => "tool_use",
            ItemKind::ToolResult => "tool_result",
            ItemKind::Thinking => "thinking",
            ItemKind::SystemInit => "system_init",
            ItemKind::CustomTitle => "custom_title",
            ItemKind::Summary => "summary",
            ItemKind::Meta => "meta",
            ItemKind::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user_message" => Some(ItemKind::UserMessage),
            "assistant_message" => Some(ItemKind::AssistantMessage),
            "tool_use" => Some(ItemKind::ToolUse),
            "tool_result" => Some(ItemKind::ToolResult),
            "thinking" => Some(ItemKind::Thinking),
            "system_init" => Some(ItemKind::SystemInit),
            "custom_title" => Some(ItemKind::CustomTitle),
            "summary" => Some(ItemKind::Summary),
            "meta" => Some(ItemKind::Meta),
            "unknown" => Some(ItemKind::Unknown),
            _ => None,
        }
    }
}

/// Metadata-only view of an item, sent when a previously-delivered line was
/// amended (group tail rewrites).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemMetadata {
    pub line_num: i64,
    pub kind: ItemKind,
    pub display_level: DisplayLevel,
    pub group_head: Option<i64>,
    pub group_tail: Option<i64>,
}

/// Full item as delivered over the wire and returned from the REST surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemPayload {
    pub line_num: i64,
    pub content: String,
    pub kind: ItemKind,
    pub display_level: DisplayLevel,
    pub group_head: Option<i64>,
    pub group_tail: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_usage: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_directory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_level_round_trips_through_strings() {
        for level in [
            DisplayLevel::DebugOnly,
            DisplayLevel::Collapsible,
            DisplayLevel::Always,
        ] {
            assert_eq!(DisplayLevel::parse(level.as_str()), Some(level));
        }
        assert_eq!(DisplayLevel::parse("bogus"), None);
    }

    #[test]
    fn item_kind_round_trips_through_strings() {
        for kind in [
            ItemKind::UserMessage,
            ItemKind::AssistantMessage,
            ItemKind::ToolUse,
            ItemKind::ToolResult,
            ItemKind::Thinking,
            ItemKind::SystemInit,
            ItemKind::CustomTitle,
            ItemKind::Summary,
            ItemKind::Meta,
            ItemKind::Unknown,
        ] {
            assert_eq!(ItemKind::parse(kind.as_str()), Some(kind));
        }
    }
}
