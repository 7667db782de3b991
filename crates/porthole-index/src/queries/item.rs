use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::records::{decimal_from_sql, decimal_to_sql, kind_from_sql, level_from_sql, ItemRecord};
use crate::Result;

const COLUMNS: &str = "session_id, line_num, content, kind, display_level, group_head, \
     group_tail, message_id, cost, context_usage, git_directory, git_branch, timestamp";

fn from_row(row: &Row) -> rusqlite::Result<(ItemRecord, String, String, Option<String>)> {
    let kind_raw: String = row.get(3)?;
    let level_raw: String = row.get(4)?;
    let cost_raw: Option<String> = row.get(8)?;
    Ok((
        ItemRecord {
            session_id: row.get(0)?,
            line_num: row.get(1)?,
            content: row.get(2)?,
            kind: porthole_types::ItemKind::Unknown,
            display_level: porthole_types::DisplayLevel::DebugOnly,
            group_head: row.get(5)?,
            group_tail: row.get(6)?,
            message_id: row.get(7)?,
            cost: None,
            context_usage: row.get(9)?,
            git_directory: row.get(10)?,
            git_branch: row.get(11)?,
            timestamp: row.get(12)?,
        },
        kind_raw,
        level_raw,
        cost_raw,
    ))
}

fn finish(raw: (ItemRecord, String, String, Option<String>)) -> Result<ItemRecord> {
    let (mut item, kind_raw, level_raw, cost_raw) = raw;
    item.kind = kind_from_sql(kind_raw)?;
    item.display_level = level_from_sql(level_raw)?;
    item.cost = decimal_from_sql(cost_raw)?;
    Ok(item)
}

pub fn insert_batch(conn: &Connection, items: &[ItemRecord]) -> Result<()> {
    let mut stmt = conn.prepare(
        r#"
        INSERT INTO session_items (
            session_id, line_num, content, kind, display_level, group_head, group_tail,
            message_id, cost, context_usage, git_directory, git_branch, timestamp
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        "#,
    )?;

    for item in items {
        stmt.execute(params![
            &item.session_id,
            item.line_num,
            &item.content,
            item.kind.as_str(),
            item.display_level.as_str(),
            item.group_head,
            item.group_tail,
            &item.message_id,
            decimal_to_sql(item.cost),
            item.context_usage,
            &item.git_directory,
            &item.git_branch,
            &item.timestamp,
        ])?;
    }

    Ok(())
}

/// Rewrite the group tail of one pre-existing line. The only metadata column
/// that can move as a side effect of later lines arriving.
pub fn set_group_tail(
    conn: &Connection,
    session_id: &str,
    line_num: i64,
    group_tail: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE session_items SET group_tail = ?3 WHERE session_id = ?1 AND line_num = ?2",
        params![session_id, line_num, group_tail],
    )?;

    Ok(())
}

/// Rewrite every derived column of an item (batch recompute). Raw content is
/// untouched.
pub fn update_derived(conn: &Connection, item: &ItemRecord) -> Result<()> {
    conn.execute(
        r#"
        UPDATE session_items
        SET kind = ?3, display_level = ?4, group_head = ?5, group_tail = ?6,
            message_id = ?7, cost = ?8, context_usage = ?9,
            git_directory = ?10, git_branch = ?11, timestamp = ?12
        WHERE session_id = ?1 AND line_num = ?2
        "#,
        params![
            &item.session_id,
            item.line_num,
            item.kind.as_str(),
            item.display_level.as_str(),
            item.group_head,
            item.group_tail,
            &item.message_id,
            decimal_to_sql(item.cost),
            item.context_usage,
            &item.git_directory,
            &item.git_branch,
            &item.timestamp,
        ],
    )?;

    Ok(())
}

pub fn list(conn: &Connection, session_id: &str, after: Option<i64>) -> Result<Vec<ItemRecord>> {
    let query = format!(
        "SELECT {} FROM session_items WHERE session_id = ?1 AND line_num > ?2 ORDER BY line_num",
        COLUMNS
    );

    let mut stmt = conn.prepare(&query)?;
    let rows = stmt
        .query_map(params![session_id, after.unwrap_or(0)], from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter().map(finish).collect()
}

pub fn get(conn: &Connection, session_id: &str, line_num: i64) -> Result<Option<ItemRecord>> {
    let query = format!(
        "SELECT {} FROM session_items WHERE session_id = ?1 AND line_num = ?2",
        COLUMNS
    );

    let raw = conn
        .query_row(&query, params![session_id, line_num], from_row)
        .optional()?;

    raw.map(finish).transpose()
}

/// Last item that is not debug-only, used to reconstruct the open-group state
/// when compute runs in live mode.
pub fn last_visible(conn: &Connection, session_id: &str) -> Result<Option<ItemRecord>> {
    let query = format!(
        "SELECT {} FROM session_items \
         WHERE session_id = ?1 AND display_level != 'debug_only' \
         ORDER BY line_num DESC LIMIT 1",
        COLUMNS
    );

    let raw = conn.query_row(&query, [session_id], from_row).optional()?;

    raw.map(finish).transpose()
}

/// Line numbers of every member of a group, in order.
pub fn group_members(conn: &Connection, session_id: &str, head: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT line_num FROM session_items \
         WHERE session_id = ?1 AND group_head = ?2 ORDER BY line_num",
    )?;

    let lines = stmt
        .query_map(params![session_id, head], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(lines)
}

/// Distinct message ids already holding a cost, for first-occurrence dedup.
pub fn seen_message_ids(conn: &Connection, session_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT message_id FROM session_items \
         WHERE session_id = ?1 AND message_id IS NOT NULL",
    )?;

    let ids = stmt
        .query_map([session_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(ids)
}

/// Raw content of lines that can carry tool_use blocks, for rebuilding the
/// tool_use_id -> line map in live mode.
pub fn tool_use_contents(conn: &Connection, session_id: &str) -> Result<Vec<(i64, String)>> {
    let mut stmt = conn.prepare(
        "SELECT line_num, content FROM session_items \
         WHERE session_id = ?1 AND kind IN ('tool_use', 'assistant_message') \
         ORDER BY line_num",
    )?;

    let rows = stmt
        .query_map([session_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Lines whose git_directory is already set; recompute must never null these.
pub fn git_directories(
    conn: &Connection,
    session_id: &str,
) -> Result<Vec<(i64, String, Option<String>)>> {
    let mut stmt = conn.prepare(
        "SELECT line_num, git_directory, git_branch FROM session_items \
         WHERE session_id = ?1 AND git_directory IS NOT NULL",
    )?;

    let rows = stmt
        .query_map([session_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}
