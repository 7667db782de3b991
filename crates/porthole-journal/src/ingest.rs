use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use porthole_engine::{
    classify, compute_item, Aggregates, ComputeState, ItemDerivation, ModelPrices, OpenGroup,
    PriceLookup, CURRENT_COMPUTE_VERSION,
};
use porthole_index::{queries, Database, ItemRecord, SessionRecord, ToolResultLinkRecord};
use porthole_types::{DisplayLevel, ItemMetadata};
use tracing::{debug, warn};

/// One unit of ingestion work: a journal file that may have grown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    pub project_id: String,
    pub session_id: String,
    pub path: PathBuf,
}

/// What one sync pass produced, for the broadcaster.
#[derive(Debug)]
pub struct IngestOutcome {
    pub session: SessionRecord,
    pub session_created: bool,
    pub items: Vec<ItemRecord>,
    /// Metadata of pre-existing lines amended as a side effect (group tails).
    pub amended: Vec<ItemMetadata>,
}

/// Price resolution backed by the model_prices table.
pub struct StorePrices<'a>(pub &'a Database);

impl PriceLookup for StorePrices<'_> {
    fn price_for(&self, model_id: &str, date: &str) -> Option<ModelPrices> {
        let row = queries::price::lookup(self.0.conn(), model_id, date).ok()??;
        Some(ModelPrices {
            input: row.input,
            output: row.output,
            cache_read: row.cache_read,
            cache_write_5m: row.cache_write_5m,
            cache_write_1h: row.cache_write_1h,
        })
    }
}

fn mtime_string(path: &std::path::Path) -> Result<String> {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("stat journal file {}", path.display()))?;
    let stamp: DateTime<Utc> = modified.into();
    Ok(stamp.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn fresh_session(job: &SyncJob) -> SessionRecord {
    SessionRecord {
        id: job.session_id.clone(),
        project_id: job.project_id.clone(),
        title: None,
        archived: false,
        pinned: false,
        parent_session_id: None,
        session_type: "main".to_string(),
        mtime: None,
        last_offset: 0,
        last_line_num: 0,
        message_count: 0,
        total_cost: None,
        context_usage: None,
        compute_version: CURRENT_COMPUTE_VERSION,
        jsonl_git_branch: None,
        git_directory: None,
        git_branch: None,
        created_at: Database::now(),
        updated_at: Database::now(),
    }
}

/// Rebuild compute context from what the store already knows about a session.
/// Live-mode compute over seeded state must agree with a batch walk from
/// scratch; the dual-mode tests hold this to account.
fn seed_state(db: &Database, session: &SessionRecord) -> Result<ComputeState> {
    let mut state = ComputeState::new();

    for message_id in queries::item::seen_message_ids(db.conn(), &session.id)? {
        state.seen_message_ids.insert(message_id);
    }

    for (line_num, content) in queries::item::tool_use_contents(db.conn(), &session.id)? {
        for block in classify(&content).tool_uses {
            state.tool_uses.insert(block.id, line_num);
        }
    }

    if let Some(last) = queries::item::last_visible(db.conn(), &session.id)? {
        let open_head = match last.display_level {
            DisplayLevel::Collapsible => last.group_head,
            DisplayLevel::Always
                if last.group_head == Some(last.line_num) && last.group_tail.is_none() =>
            {
                last.group_head
            }
            _ => None,
        };
        if let Some(head) = open_head {
            let members = queries::item::group_members(db.conn(), &session.id, head)?;
            state.open_group = Some(OpenGroup { head, members });
        }
    }

    Ok(state)
}

/// Run one sync pass over a journal file.
///
/// Returns None when there is nothing new. On any store error the transaction
/// rolls back and the cursor stays put; the next watcher event retries the
/// same bytes.
pub fn sync_session(db: &mut Database, job: &SyncJob) -> Result<Option<IngestOutcome>> {
    let mtime = mtime_string(&job.path)?;

    let existing = queries::session::get(db.conn(), &job.session_id)?;
    let session_created = existing.is_none();
    let session = existing.unwrap_or_else(|| fresh_session(job));

    if !session_created && session.mtime.as_deref() == Some(mtime.as_str()) {
        return Ok(None);
    }

    let tail = crate::reader::read_from_offset(&job.path, session.last_offset as u64)?;
    if tail.lines.is_empty() {
        if !session_created {
            queries::session::touch_mtime(db.conn(), &job.session_id, &mtime)?;
        }
        return Ok(None);
    }

    // Derive everything before touching the store; writes happen in one
    // transaction below.
    let mut state = seed_state(db, &session)?;
    let prices = StorePrices(db);

    let mut derivations: Vec<(ItemDerivation, String)> = Vec::with_capacity(tail.lines.len());
    let mut batch_aggregates = Aggregates::default();
    let mut external_tails: BTreeMap<i64, i64> = BTreeMap::new();
    let mut learned_cwd: Option<String> = None;
    let mut sidechain_agent: Option<String> = None;
    let mut first_user_text: Option<String> = None;
    let mut is_sidechain_session = false;

    for (index, raw) in tail.lines.iter().enumerate() {
        let line_num = session.last_line_num + index as i64 + 1;
        let derivation = compute_item(&mut state, line_num, raw, &prices);

        for (amended_line, new_tail) in &derivation.amended_tails {
            if *amended_line > session.last_line_num {
                if let Some((earlier, _)) = derivations
                    .iter_mut()
                    .find(|(d, _)| d.line_num == *amended_line)
                {
                    earlier.group_tail = Some(*new_tail);
                }
            } else {
                external_tails.insert(*amended_line, *new_tail);
            }
        }

        if learned_cwd.is_none() {
            learned_cwd = derivation.cwd.clone();
        }
        if derivation.is_sidechain {
            is_sidechain_session = true;
            if sidechain_agent.is_none() {
                sidechain_agent = derivation.record_agent_id.clone();
            }
        }
        if first_user_text.is_none() {
            first_user_text = derivation.user_text.clone();
        }

        batch_aggregates.absorb(&derivation);
        derivations.push((derivation, raw.clone()));
    }

    let new_last_line = session.last_line_num + derivations.len() as i64;

    let items: Vec<ItemRecord> = derivations
        .iter()
        .map(|(d, raw)| ItemRecord {
            session_id: job.session_id.clone(),
            line_num: d.line_num,
            content: raw.clone(),
            kind: d.kind,
            display_level: d.display_level,
            group_head: d.group_head,
            group_tail: d.group_tail,
            message_id: d.message_id.clone(),
            cost: d.cost,
            context_usage: d.context_usage,
            git_directory: d.git_directory.clone(),
            git_branch: d.git_branch.clone(),
            timestamp: d.timestamp.clone(),
        })
        .collect();

    let tool_links: Vec<ToolResultLinkRecord> = derivations
        .iter()
        .flat_map(|(d, _)| {
            d.tool_result_links
                .iter()
                .map(|(use_line, tool_use_id)| ToolResultLinkRecord {
                    session_id: job.session_id.clone(),
                    tool_use_line_num: *use_line,
                    tool_result_line_num: d.line_num,
                    tool_use_id: tool_use_id.clone(),
                })
        })
        .collect();

    // Everything from here mutates the store atomically.
    let tx = db.conn_mut().transaction()?;

    queries::project::upsert(&tx, &job.project_id, learned_cwd.as_deref())?;
    if session_created {
        queries::session::insert(&tx, &session)?;
    }

    queries::item::insert_batch(&tx, &items)?;
    for (line_num, new_tail) in &external_tails {
        queries::item::set_group_tail(&tx, &job.session_id, *line_num, *new_tail)?;
    }
    queries::link::insert_tool_result_links(&tx, &tool_links)?;

    for (derivation, _) in &derivations {
        for task in &derivation.task_registrations {
            queries::link::register_task(
                &tx,
                &job.session_id,
                derivation.line_num,
                &task.tool_use_id,
                task.prompt.as_deref(),
            )?;
        }
        for (tool_use_id, agent_id) in &derivation.observed_agents {
            queries::link::set_agent_id(&tx, &job.session_id, tool_use_id, agent_id)?;
        }
    }

    // A sidechain journal is a subagent session; tie it to the Task that
    // spawned it, preferring the agent id the parent observed, falling back
    // to matching the opening prompt.
    if is_sidechain_session && session.parent_session_id.is_none() {
        let link = match &sidechain_agent {
            Some(agent_id) => queries::link::find_by_agent_id(&tx, agent_id)?,
            None => None,
        };
        let link = match (link, &first_user_text) {
            (Some(found), _) => Some(found),
            (None, Some(prompt)) => {
                let matched = queries::link::find_unclaimed_by_prompt(&tx, prompt)?;
                if let Some(found) = &matched {
                    let claimed_agent = sidechain_agent
                        .clone()
                        .unwrap_or_else(|| job.session_id.clone());
                    queries::link::set_agent_id(
                        &tx,
                        &found.session_id,
                        &found.tool_use_id,
                        &claimed_agent,
                    )?;
                }
                matched
            }
            (None, None) => None,
        };
        if let Some(link) = link
            && link.session_id != job.session_id
        {
            queries::session::set_parent(&tx, &job.session_id, &link.session_id)?;
        }
    }

    let message_count = session.message_count + batch_aggregates.message_count;
    let total_cost = match (session.total_cost, batch_aggregates.total_cost) {
        (Some(a), Some(b)) => Some(a + b),
        (a, b) => a.or(b),
    };
    queries::session::update_aggregates(
        &tx,
        &job.session_id,
        message_count,
        total_cost,
        batch_aggregates.context_usage,
        batch_aggregates.jsonl_git_branch.as_deref(),
        batch_aggregates.git_directory.as_deref(),
        batch_aggregates.git_branch.as_deref(),
    )?;
    queries::session::advance_cursor(
        &tx,
        &job.session_id,
        tail.new_offset as i64,
        new_last_line,
        &mtime,
    )?;

    tx.commit()?;

    debug!(
        session_id = %job.session_id,
        new_items = items.len(),
        amended = external_tails.len(),
        "journal sync pass committed"
    );

    let session = queries::session::get(db.conn(), &job.session_id)?
        .context("session row vanished after commit")?;

    let mut amended = Vec::with_capacity(external_tails.len());
    for line_num in external_tails.keys() {
        match queries::item::get(db.conn(), &job.session_id, *line_num)? {
            Some(item) => amended.push(item.metadata()),
            None => warn!(
                session_id = %job.session_id,
                line_num,
                "amended line missing after commit"
            ),
        }
    }

    Ok(Some(IngestOutcome {
        session,
        session_created,
        items,
        amended,
    }))
}
