use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::records::{decimal_from_sql, decimal_to_sql, SessionRecord};
use crate::{Database, Error, Result};

fn from_row(row: &Row) -> rusqlite::Result<(SessionRecord, Option<String>)> {
    // total_cost comes back raw; decimal parsing happens outside the rusqlite
    // closure so a corrupt column surfaces as CorruptDecimal, not a panic.
    let raw_cost: Option<String> = row.get(11)?;
    Ok((
        SessionRecord {
            id: row.get(0)?,
            project_id: row.get(1)?,
            title: row.get(2)?,
            archived: row.get(3)?,
            pinned: row.get(4)?,
            parent_session_id: row.get(5)?,
            session_type: row.get(6)?,
            mtime: row.get(7)?,
            last_offset: row.get(8)?,
            last_line_num: row.get(9)?,
            message_count: row.get(10)?,
            total_cost: None,
            context_usage: row.get(12)?,
            compute_version: row.get(13)?,
            jsonl_git_branch: row.get(14)?,
            git_directory: row.get(15)?,
            git_branch: row.get(16)?,
            created_at: row.get(17)?,
            updated_at: row.get(18)?,
        },
        raw_cost,
    ))
}

fn finish(pair: (SessionRecord, Option<String>)) -> Result<SessionRecord> {
    let (mut record, raw_cost) = pair;
    record.total_cost = decimal_from_sql(raw_cost)?;
    Ok(record)
}

const COLUMNS: &str = "id, project_id, title, archived, pinned, parent_session_id, session_type, \
     mtime, last_offset, last_line_num, message_count, total_cost, context_usage, \
     compute_version, jsonl_git_branch, git_directory, git_branch, created_at, updated_at";

pub fn get(conn: &Connection, session_id: &str) -> Result<Option<SessionRecord>> {
    let query = format!("SELECT {} FROM sessions WHERE id = ?1", COLUMNS);
    let pair = conn
        .query_row(&query, [session_id], from_row)
        .optional()?;

    pair.map(finish).transpose()
}

pub fn exists(conn: &Connection, session_id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM sessions WHERE id = ?1", [session_id], |row| {
            row.get(0)
        })
        .optional()?;

    Ok(found.is_some())
}

/// Create the session row on first contact with its journal file.
pub fn insert(conn: &Connection, session: &SessionRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO sessions (
            id, project_id, title, archived, pinned, parent_session_id, session_type,
            mtime, last_offset, last_line_num, message_count, total_cost, context_usage,
            compute_version, jsonl_git_branch, git_directory, git_branch, created_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
        "#,
        params![
            &session.id,
            &session.project_id,
            &session.title,
            session.archived,
            session.pinned,
            &session.parent_session_id,
            &session.session_type,
            &session.mtime,
            session.last_offset,
            session.last_line_num,
            session.message_count,
            decimal_to_sql(session.total_cost),
            session.context_usage,
            session.compute_version,
            &session.jsonl_git_branch,
            &session.git_directory,
            &session.git_branch,
            &session.created_at,
            &session.updated_at,
        ],
    )?;

    Ok(())
}

pub fn list(
    conn: &Connection,
    project_id: Option<&str>,
    include_archived: bool,
) -> Result<Vec<SessionRecord>> {
    let mut where_clauses = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(project) = project_id {
        where_clauses.push("project_id = ?");
        params.push(Box::new(project.to_string()));
    }
    if !include_archived {
        where_clauses.push("archived = 0");
    }

    let where_clause = if where_clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", where_clauses.join(" AND "))
    };

    let query = format!(
        "SELECT {} FROM sessions {} ORDER BY pinned DESC, mtime DESC",
        COLUMNS, where_clause
    );

    let mut stmt = conn.prepare(&query)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let pairs = stmt
        .query_map(param_refs.as_slice(), from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    pairs.into_iter().map(finish).collect()
}

/// Advance the ingestion cursor. Offsets are monotone; a smaller value than
/// what is stored indicates a logic error upstream and is rejected.
pub fn advance_cursor(
    conn: &Connection,
    session_id: &str,
    last_offset: i64,
    last_line_num: i64,
    mtime: &str,
) -> Result<()> {
    let updated = conn.execute(
        r#"
        UPDATE sessions
        SET last_offset = ?2, last_line_num = ?3, mtime = ?4, updated_at = ?5
        WHERE id = ?1 AND last_offset <= ?2 AND last_line_num <= ?3
        "#,
        params![session_id, last_offset, last_line_num, mtime, Database::now()],
    )?;

    if updated == 0 {
        return Err(Error::CursorRegression {
            session_id: session_id.to_string(),
        });
    }

    Ok(())
}

pub fn touch_mtime(conn: &Connection, session_id: &str, mtime: &str) -> Result<()> {
    conn.execute(
        "UPDATE sessions SET mtime = ?2 WHERE id = ?1",
        params![session_id, mtime],
    )?;

    Ok(())
}

/// Rewrite the aggregate columns after an ingest batch or a full recompute.
pub fn update_aggregates(
    conn: &Connection,
    session_id: &str,
    message_count: i64,
    total_cost: Option<Decimal>,
    context_usage: Option<i64>,
    jsonl_git_branch: Option<&str>,
    git_directory: Option<&str>,
    git_branch: Option<&str>,
) -> Result<()> {
    conn.execute(
        r#"
        UPDATE sessions
        SET message_count = ?2,
            total_cost = ?3,
            context_usage = COALESCE(?4, context_usage),
            jsonl_git_branch = COALESCE(?5, jsonl_git_branch),
            git_directory = COALESCE(?6, git_directory),
            git_branch = COALESCE(?7, git_branch),
            updated_at = ?8
        WHERE id = ?1
        "#,
        params![
            session_id,
            message_count,
            decimal_to_sql(total_cost),
            context_usage,
            jsonl_git_branch,
            git_directory,
            git_branch,
            Database::now(),
        ],
    )?;

    Ok(())
}

pub fn set_flags(
    conn: &Connection,
    session_id: &str,
    title: Option<&str>,
    archived: Option<bool>,
    pinned: Option<bool>,
) -> Result<()> {
    conn.execute(
        r#"
        UPDATE sessions
        SET title = COALESCE(?2, title),
            archived = COALESCE(?3, archived),
            pinned = COALESCE(?4, pinned),
            updated_at = ?5
        WHERE id = ?1
        "#,
        params![session_id, title, archived, pinned, Database::now()],
    )?;

    Ok(())
}

pub fn set_parent(
    conn: &Connection,
    session_id: &str,
    parent_session_id: &str,
) -> Result<()> {
    conn.execute(
        r#"
        UPDATE sessions
        SET parent_session_id = ?2, session_type = 'subagent', updated_at = ?3
        WHERE id = ?1
        "#,
        params![session_id, parent_session_id, Database::now()],
    )?;

    Ok(())
}

pub fn set_compute_version(conn: &Connection, session_id: &str, version: i64) -> Result<()> {
    conn.execute(
        "UPDATE sessions SET compute_version = ?2, updated_at = ?3 WHERE id = ?1",
        params![session_id, version, Database::now()],
    )?;

    Ok(())
}

/// Sessions whose stored metadata was derived by an older engine.
pub fn list_lagging(conn: &Connection, current_version: i64) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT id FROM sessions WHERE compute_version < ?1 ORDER BY id")?;

    let ids = stmt
        .query_map([current_version], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(ids)
}

/// Remove a session and everything hanging off it.
pub fn delete(conn: &Connection, session_id: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM tool_result_links WHERE session_id = ?1",
        [session_id],
    )?;
    conn.execute("DELETE FROM agent_links WHERE session_id = ?1", [session_id])?;
    conn.execute(
        "DELETE FROM session_items WHERE session_id = ?1",
        [session_id],
    )?;
    conn.execute("DELETE FROM sessions WHERE id = ?1", [session_id])?;

    Ok(())
}
