use anyhow::{Context, Result};
use porthole_engine::{compute_batch, ComputeState, CURRENT_COMPUTE_VERSION};
use porthole_index::{queries, Database, ItemRecord, SessionRecord, ToolResultLinkRecord};
use tracing::info;

use crate::ingest::StorePrices;

/// Re-derive a whole session's metadata from its stored raw lines.
///
/// Used when CURRENT_COMPUTE_VERSION moves past the session's stored version.
/// Items whose git_directory is already set keep it verbatim, so deleting a
/// worktree after the fact never erases where the work happened.
pub fn recompute_session(db: &mut Database, session_id: &str) -> Result<Option<SessionRecord>> {
    if !queries::session::exists(db.conn(), session_id)? {
        return Ok(None);
    }

    let stored = queries::item::list(db.conn(), session_id, None)?;
    let lines: Vec<(i64, String)> = stored
        .iter()
        .map(|item| (item.line_num, item.content.clone()))
        .collect();

    let mut state = ComputeState::new();
    for (line_num, directory, branch) in queries::item::git_directories(db.conn(), session_id)? {
        state.preserved_git.insert(line_num, (directory, branch));
    }

    let prices = StorePrices(db);
    let (derivations, aggregates) = compute_batch(&mut state, &lines, &prices);

    let tx = db.conn_mut().transaction()?;

    for derivation in &derivations {
        let item = ItemRecord {
            session_id: session_id.to_string(),
            line_num: derivation.line_num,
            content: String::new(), // content column is not rewritten
            kind: derivation.kind,
            display_level: derivation.display_level,
            group_head: derivation.group_head,
            group_tail: derivation.group_tail,
            message_id: derivation.message_id.clone(),
            cost: derivation.cost,
            context_usage: derivation.context_usage,
            git_directory: derivation.git_directory.clone(),
            git_branch: derivation.git_branch.clone(),
            timestamp: derivation.timestamp.clone(),
        };
        queries::item::update_derived(&tx, &item)?;
    }

    // Link facts are derived data: rebuild tool_result_links from scratch.
    // agent_links survive because they carry agent ids learned over time.
    queries::link::delete_tool_result_links(&tx, session_id)?;
    let links: Vec<ToolResultLinkRecord> = derivations
        .iter()
        .flat_map(|d| {
            d.tool_result_links
                .iter()
                .map(|(use_line, tool_use_id)| ToolResultLinkRecord {
                    session_id: session_id.to_string(),
                    tool_use_line_num: *use_line,
                    tool_result_line_num: d.line_num,
                    tool_use_id: tool_use_id.clone(),
                })
        })
        .collect();
    queries::link::insert_tool_result_links(&tx, &links)?;

    for derivation in &derivations {
        for task in &derivation.task_registrations {
            queries::link::register_task(
                &tx,
                session_id,
                derivation.line_num,
                &task.tool_use_id,
                task.prompt.as_deref(),
            )?;
        }
    }

    queries::session::update_aggregates(
        &tx,
        session_id,
        aggregates.message_count,
        aggregates.total_cost,
        aggregates.context_usage,
        aggregates.jsonl_git_branch.as_deref(),
        aggregates.git_directory.as_deref(),
        aggregates.git_branch.as_deref(),
    )?;
    queries::session::set_compute_version(&tx, session_id, CURRENT_COMPUTE_VERSION)?;

    tx.commit()?;

    info!(
        session_id,
        items = derivations.len(),
        version = CURRENT_COMPUTE_VERSION,
        "session recomputed"
    );

    let refreshed = queries::session::get(db.conn(), session_id)?
        .context("session row vanished during recompute")?;

    Ok(Some(refreshed))
}
