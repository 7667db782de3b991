mod db;
mod error;
mod records;
mod schema;

pub mod queries;

pub use db::Database;
pub use error::{Error, Result};
pub use records::{
    AgentLinkRecord, ItemRecord, ModelPriceRecord, ProjectRecord, SessionRecord,
    ToolResultLinkRecord,
};
