use std::str::FromStr;

use porthole_types::{DisplayLevel, ItemKind, ItemMetadata, ItemPayload, SessionPayload};
use rust_decimal::Decimal;

use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct ProjectRecord {
    pub id: String,
    pub path: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    pub project_id: String,
    pub title: Option<String>,
    pub archived: bool,
    pub pinned: bool,
    pub parent_session_id: Option<String>,
    pub session_type: String,
    pub mtime: Option<String>,
    pub last_offset: i64,
    pub last_line_num: i64,
    pub message_count: i64,
    pub total_cost: Option<Decimal>,
    pub context_usage: Option<i64>,
    pub compute_version: i64,
    pub jsonl_git_branch: Option<String>,
    pub git_directory: Option<String>,
    pub git_branch: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl SessionRecord {
    pub fn to_payload(&self) -> SessionPayload {
        SessionPayload {
            id: self.id.clone(),
            project_id: self.project_id.clone(),
            title: self.title.clone(),
            archived: self.archived,
            pinned: self.pinned,
            parent_session_id: self.parent_session_id.clone(),
            session_type: self.session_type.clone(),
            message_count: self.message_count,
            total_cost: self.total_cost,
            context_usage: self.context_usage,
            jsonl_git_branch: self.jsonl_git_branch.clone(),
            git_directory: self.git_directory.clone(),
            git_branch: self.git_branch.clone(),
            mtime: self.mtime.clone(),
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ItemRecord {
    pub session_id: String,
    pub line_num: i64,
    pub content: String,
    pub kind: ItemKind,
    pub display_level: DisplayLevel,
    pub group_head: Option<i64>,
    pub group_tail: Option<i64>,
    pub message_id: Option<String>,
    pub cost: Option<Decimal>,
    pub context_usage: Option<i64>,
    pub git_directory: Option<String>,
    pub git_branch: Option<String>,
    pub timestamp: Option<String>,
}

impl ItemRecord {
    pub fn to_payload(&self) -> ItemPayload {
        ItemPayload {
            line_num: self.line_num,
            content: self.content.clone(),
            kind: self.kind,
            display_level: self.display_level,
            group_head: self.group_head,
            group_tail: self.group_tail,
            message_id: self.message_id.clone(),
            cost: self.cost,
            context_usage: self.context_usage,
            git_directory: self.git_directory.clone(),
            git_branch: self.git_branch.clone(),
            timestamp: self.timestamp.clone(),
        }
    }

    pub fn metadata(&self) -> ItemMetadata {
        ItemMetadata {
            line_num: self.line_num,
            kind: self.kind,
            display_level: self.display_level,
            group_head: self.group_head,
            group_tail: self.group_tail,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResultLinkRecord {
    pub session_id: String,
    pub tool_use_line_num: i64,
    pub tool_result_line_num: i64,
    pub tool_use_id: String,
}

#[derive(Debug, Clone)]
pub struct AgentLinkRecord {
    pub session_id: String,
    pub tool_use_line_num: i64,
    pub tool_use_id: String,
    pub prompt: Option<String>,
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPriceRecord {
    pub model_id: String,
    /// ISO date (YYYY-MM-DD); lexical order is chronological order.
    pub effective_date: String,
    pub input: Decimal,
    pub output: Decimal,
    pub cache_read: Decimal,
    pub cache_write_5m: Decimal,
    pub cache_write_1h: Decimal,
}

impl ModelPriceRecord {
    /// The comparable price tuple, for change detection on sync.
    pub fn tuple(&self) -> (Decimal, Decimal, Decimal, Decimal, Decimal) {
        (
            self.input,
            self.output,
            self.cache_read,
            self.cache_write_5m,
            self.cache_write_1h,
        )
    }
}

pub(crate) fn decimal_to_sql(value: Option<Decimal>) -> Option<String> {
    value.map(|d| d.to_string())
}

pub(crate) fn decimal_from_sql(value: Option<String>) -> Result<Option<Decimal>> {
    value.map(required_decimal).transpose()
}

pub(crate) fn required_decimal(value: String) -> Result<Decimal> {
    Decimal::from_str(&value).map_err(|source| Error::CorruptDecimal { value, source })
}

pub(crate) fn kind_from_sql(value: String) -> Result<ItemKind> {
    ItemKind::parse(&value).ok_or(Error::UnknownKind(value))
}

pub(crate) fn level_from_sql(value: String) -> Result<DisplayLevel> {
    DisplayLevel::parse(&value).ok_or(Error::UnknownLevel(value))
}
