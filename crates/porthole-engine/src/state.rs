use std::collections::{HashMap, HashSet};

use crate::gitroot::GitCache;

/// The collapsible run currently accepting members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenGroup {
    pub head: i64,
    /// Every line whose group_head is `head`, in order, including any
    /// `always` starter. Tail rewrites fan out over this list.
    pub members: Vec<i64>,
}

/// Accumulated context the per-line derivation reads and writes.
///
/// Batch mode starts from `ComputeState::default()`. Live mode seeds the same
/// struct from the store before processing new lines, which is what keeps the
/// two modes semantically identical.
#[derive(Debug, Default)]
pub struct ComputeState {
    pub open_group: Option<OpenGroup>,
    /// message ids that already consumed their cost slot.
    pub seen_message_ids: HashSet<String>,
    /// tool_use_id -> line that introduced it.
    pub tool_uses: HashMap<String, i64>,
    pub git_cache: GitCache,
    /// line -> (git_directory, git_branch) that must survive recompute.
    pub preserved_git: HashMap<i64, (String, Option<String>)>,
}

impl ComputeState {
    pub fn new() -> Self {
        Self::default()
    }
}
