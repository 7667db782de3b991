mod classify;
mod compute;
mod cost;
mod gitroot;
mod state;

pub use classify::{classify, Classified, ToolResultRef, ToolUseBlock};
pub use compute::{compute_batch, compute_item, Aggregates, ItemDerivation, TaskRegistration};
pub use cost::{compute_cost, date_of, normalize_model_id, ModelPrices, PriceLookup};
pub use gitroot::{resolve_for_paths, GitCache, GitInfo};
pub use state::{ComputeState, OpenGroup};

/// Bump to force a full batch recompute of every session's derived metadata.
/// Sessions whose stored version lags are revisited by the background worker.
pub const CURRENT_COMPUTE_VERSION: i64 = 1;
