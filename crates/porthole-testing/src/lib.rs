//! Test fixtures shared across porthole crates: a temp journal tree and
//! builders for the JSONL event shapes the ingestion pipeline consumes.

mod fixtures;
mod world;

pub use fixtures::{
    assistant_text_line, assistant_text_with_tool_use_line, assistant_usage_line,
    custom_title_line, system_init_line, task_line, tool_result_line, tool_use_line,
    user_text_line,
};
pub use world::JournalWorld;
