use porthole_types::{DisplayLevel, ItemKind};
use rust_decimal::Decimal;

use crate::classify::classify;
use crate::cost::{compute_cost, date_of, normalize_model_id, PriceLookup};
use crate::gitroot::{extract_tool_paths, resolve_for_paths};
use crate::state::{ComputeState, OpenGroup};

/// A Task tool_use waiting for its subagent session to appear.
#[derive(Debug, Clone)]
pub struct TaskRegistration {
    pub tool_use_id: String,
    pub prompt: Option<String>,
}

/// Everything derived from one journal line, plus the side effects it had on
/// earlier lines and the link facts it produced.
#[derive(Debug, Clone)]
pub struct ItemDerivation {
    pub line_num: i64,
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
    /// Earlier lines whose group_tail moved to this line.
    pub amended_tails: Vec<(i64, i64)>,
    /// (tool_use_line, tool_use_id) pairs completed by this line's results.
    pub tool_result_links: Vec<(i64, String)>,
    /// Task tool_uses introduced on this line.
    pub task_registrations: Vec<TaskRegistration>,
    /// (tool_use_id, agent_id) observed in tool_result blocks.
    pub observed_agents: Vec<(String, String)>,
    pub cwd: Option<String>,
    pub jsonl_git_branch: Option<String>,
    pub is_sidechain: bool,
    pub record_agent_id: Option<String>,
    pub user_text: Option<String>,
}

/// Derive one line. Pure over (raw, state, prices): batch and live modes both
/// call this, differing only in how `state` was seeded.
pub fn compute_item(
    state: &mut ComputeState,
    line_num: i64,
    raw: &str,
    prices: &dyn PriceLookup,
) -> ItemDerivation {
    let classified = classify(raw);

    let mut derivation = ItemDerivation {
        line_num,
        kind: classified.kind,
        display_level: classified.display_level,
        group_head: None,
        group_tail: None,
        message_id: classified.message_id.clone(),
        cost: None,
        context_usage: None,
        git_directory: None,
        git_branch: None,
        timestamp: classified.timestamp.clone(),
        amended_tails: Vec::new(),
        tool_result_links: Vec::new(),
        task_registrations: Vec::new(),
        observed_agents: Vec::new(),
        cwd: classified.cwd.clone(),
        jsonl_git_branch: classified.jsonl_git_branch.clone(),
        is_sidechain: classified.is_sidechain,
        record_agent_id: classified.record_agent_id.clone(),
        user_text: classified.user_text.clone(),
    };

    // Grouping. Debug-only lines neither join nor close groups.
    match classified.display_level {
        DisplayLevel::Collapsible => match &mut state.open_group {
            Some(group) => {
                derivation.group_head = Some(group.head);
                derivation.group_tail = Some(line_num);
                derivation.amended_tails =
                    group.members.iter().map(|&m| (m, line_num)).collect();
                group.members.push(line_num);
            }
            None => {
                derivation.group_head = Some(line_num);
                derivation.group_tail = Some(line_num);
                state.open_group = Some(OpenGroup {
                    head: line_num,
                    members: vec![line_num],
                });
            }
        },
        DisplayLevel::Always => {
            if classified.leads_with_tool_result && state.open_group.is_some() {
                // Prefix: this line concludes the open run and closes it.
                let group = state.open_group.take().unwrap_or(OpenGroup {
                    head: line_num,
                    members: Vec::new(),
                });
                derivation.group_head = Some(group.head);
                derivation.group_tail = Some(line_num);
                derivation.amended_tails =
                    group.members.iter().map(|&m| (m, line_num)).collect();
            } else if classified.trails_with_tool_use {
                // Suffix: open a pseudo-group; the tail stays null until a
                // collapsible line joins.
                derivation.group_head = Some(line_num);
                derivation.group_tail = None;
                state.open_group = Some(OpenGroup {
                    head: line_num,
                    members: vec![line_num],
                });
            } else {
                state.open_group = None;
            }
        }
        DisplayLevel::DebugOnly => {}
    }

    // Tool registry and link facts.
    for block in &classified.tool_uses {
        state.tool_uses.insert(block.id.clone(), line_num);
        if block.name == "Task" {
            let prompt = block
                .input
                .get("prompt")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            derivation.task_registrations.push(TaskRegistration {
                tool_use_id: block.id.clone(),
                prompt,
            });
        }
    }
    for result in &classified.tool_results {
        if let Some(&use_line) = state.tool_uses.get(&result.tool_use_id) {
            derivation
                .tool_result_links
                .push((use_line, result.tool_use_id.clone()));
        }
        if let Some(agent_id) = &result.agent_id {
            derivation
                .observed_agents
                .push((result.tool_use_id.clone(), agent_id.clone()));
        }
    }

    // Cost and context usage. The first line carrying a message id consumes
    // that id's cost slot, whether or not it also carries usage.
    let first_occurrence = match &classified.message_id {
        Some(message_id) => state.seen_message_ids.insert(message_id.clone()),
        None => false,
    };
    if let Some(usage) = &classified.usage {
        derivation.context_usage = Some(usage.context_total() as i64);

        if first_occurrence {
            derivation.cost = classified
                .model
                .as_deref()
                .zip(classified.timestamp.as_deref().and_then(date_of))
                .and_then(|(model, date)| prices.price_for(&normalize_model_id(model), &date))
                .map(|model_prices| compute_cost(usage, &model_prices));
        }
    }

    // Git resolution. A line that already has a stored git_directory keeps it
    // verbatim; worktrees deleted after the fact must not erase history.
    if let Some((directory, branch)) = state.preserved_git.get(&line_num) {
        derivation.git_directory = Some(directory.clone());
        derivation.git_branch = branch.clone();
    } else {
        let paths = extract_tool_paths(&classified.tool_uses);
        if !paths.is_empty()
            && let Some(info) = resolve_for_paths(&paths, &mut state.git_cache)
        {
            derivation.git_directory = Some(info.directory.display().to_string());
            derivation.git_branch = info.branch;
        }
    }

    derivation
}

/// Session-level aggregates folded from a sequence of derivations.
#[derive(Debug, Clone, Default)]
pub struct Aggregates {
    pub message_count: i64,
    pub total_cost: Option<Decimal>,
    pub context_usage: Option<i64>,
    pub jsonl_git_branch: Option<String>,
    pub git_directory: Option<String>,
    pub git_branch: Option<String>,
}

impl Aggregates {
    pub fn absorb(&mut self, derivation: &ItemDerivation) {
        if derivation.display_level == DisplayLevel::Always {
            self.message_count += 1;
        }
        if let Some(cost) = derivation.cost {
            self.total_cost = Some(self.total_cost.unwrap_or_default() + cost);
        }
        if derivation.context_usage.is_some() {
            self.context_usage = derivation.context_usage;
        }
        if derivation.jsonl_git_branch.is_some() {
            self.jsonl_git_branch = derivation.jsonl_git_branch.clone();
        }
        if derivation.git_directory.is_some() {
            self.git_directory = derivation.git_directory.clone();
            self.git_branch = derivation.git_branch.clone();
        }
    }
}

/// Batch mode: derive a whole session from a clean slate. `state` should carry
/// only the preserved git directories when recomputing an existing session.
pub fn compute_batch(
    state: &mut ComputeState,
    lines: &[(i64, String)],
    prices: &dyn PriceLookup,
) -> (Vec<ItemDerivation>, Aggregates) {
    let mut derivations: Vec<ItemDerivation> = Vec::with_capacity(lines.len());
    let mut aggregates = Aggregates::default();

    for (line_num, raw) in lines {
        let derivation = compute_item(state, *line_num, raw, prices);

        // Within a batch, tail rewrites land directly on earlier derivations;
        // only amendments to lines outside the batch survive in the output.
        let mut external = Vec::new();
        for (amended_line, new_tail) in &derivation.amended_tails {
            match derivations
                .iter_mut()
                .find(|d| d.line_num == *amended_line)
            {
                Some(earlier) => earlier.group_tail = Some(*new_tail),
                None => external.push((*amended_line, *new_tail)),
            }
        }

        let mut derivation = derivation;
        derivation.amended_tails = external;
        aggregates.absorb(&derivation);
        derivations.push(derivation);
    }

    (derivations, aggregates)
}
