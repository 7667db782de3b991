mod item;
mod journal;
mod process;
mod protocol;

pub use item::{DisplayLevel, ItemKind, ItemMetadata, ItemPayload};
pub use journal::{
    AssistantContent, AssistantMessage, CacheCreation, JournalRecord, TokenUsage, UserContent,
    UserMessage,
};
pub use process::{
    KillReason, PendingDecision, PendingRequestInfo, PendingRequestKind, ProcessSnapshot,
    ProcessState,
};
pub use protocol::{
    ApprovalDecision, ClientMessage, DocumentAttachment, ImageAttachment, PendingResponse,
    ServerMessage, SessionPayload,
};
